pub mod command_matcher;
pub mod console;
pub mod console_authorisation;
pub mod console_template;
pub mod directory_role_binding;
pub mod history;
pub mod labels;
pub mod naming;
pub mod release;
pub mod rollback;
pub mod rollback_chain;

pub use command_matcher::CommandMatcher;
pub use console::{Console, ConsolePhase, ConsoleSpec, ConsoleStatus};
pub use console_authorisation::{ConsoleAuthorisation, ConsoleAuthorisationSpec};
pub use console_template::{AuthorisationRule, ConsoleTemplate, ConsoleTemplateSpec};
pub use directory_role_binding::{
    DirectoryRoleBinding, DirectoryRoleBindingSpec, DirectoryRoleBindingStatus, GROUP_SUBJECT_KIND,
};
pub use release::{PreviousRelease, Release, ReleaseSpec, ReleaseStatus, Revision};
pub use rollback::{Rollback, RollbackPhase, RollbackSpec, RollbackStatus};
