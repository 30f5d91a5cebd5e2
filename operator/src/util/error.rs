#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("Invalid user input: {0}")]
    UserInput(String),

    #[error("Json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Parse duration: {source}")]
    ParseDuration {
        #[from]
        source: parse_duration::parse::Error,
    },

    #[error("Directory error: {source}")]
    Directory {
        #[from]
        source: theatre_directory::Error,
    },

    #[error("Deployer error: {0}")]
    Deployer(theatre_deployer::DeployerError),
}

impl From<theatre_deployer::DeployerError> for Error {
    fn from(source: theatre_deployer::DeployerError) -> Self {
        Error::Deployer(source)
    }
}
