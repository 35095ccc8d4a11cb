use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::ProctorResult;

use super::{controller::ProctorController, state::ProctorState};

/// Commands the presentation layer sends to the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProctorCommand {
    Start,
    Stop,
}

impl FromStr for ProctorCommand {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(ProctorCommand::Start),
            "stop" => Ok(ProctorCommand::Stop),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

pub async fn dispatch(
    controller: &ProctorController,
    command: ProctorCommand,
) -> ProctorResult<ProctorState> {
    match command {
        ProctorCommand::Start => controller.start().await,
        ProctorCommand::Stop => controller.stop().await.map(ProctorState::Stopped),
    }
}

/// Applies commands from `rx` in arrival order until the sender side closes.
pub fn spawn_command_listener(
    controller: ProctorController,
    mut rx: mpsc::Receiver<ProctorCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match dispatch(&controller, command).await {
                Ok(state) => info!("{command:?} -> {state:?}"),
                Err(err) => warn!("{command:?} rejected: {err}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("start".parse::<ProctorCommand>(), Ok(ProctorCommand::Start));
        assert_eq!(" STOP\n".parse::<ProctorCommand>(), Ok(ProctorCommand::Stop));
        assert!("pause".parse::<ProctorCommand>().is_err());
    }
}
