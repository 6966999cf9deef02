mod logging;
mod player;
mod tone;

use player::Player;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let player = match Player::new() {
        Ok(player) => player,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if player::wants_device_list() {
        return match player.list_devices() {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("failed to list devices: {e}");
                ExitCode::FAILURE
            }
        };
    }

    match player.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
