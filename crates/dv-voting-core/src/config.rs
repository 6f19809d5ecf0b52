use dv_api_types::{BindingMode, DeploymentEnvironment};

/// Gas supplied with every vote transaction. Never estimated.
pub const DEFAULT_VOTE_GAS_LIMIT: u64 = 100_000;

#[derive(Debug, Clone)]
pub struct VotingConfig {
    pub gas_limit: u64,
    pub auto_detect: bool,
    pub environment: DeploymentEnvironment,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_VOTE_GAS_LIMIT,
            auto_detect: true,
            environment: DeploymentEnvironment::Production,
        }
    }
}

impl VotingConfig {
    pub fn default_mode(&self) -> BindingMode {
        if self.auto_detect {
            BindingMode::AutoDetect
        } else {
            BindingMode::Manual
        }
    }
}
