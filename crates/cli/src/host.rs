use parking_lot::Mutex;
use romvault_core::{models::InstallationData, HostEvents, Severity};
use tracing::{error, info};

/// What the core reported back for one game.
#[derive(Debug, Clone)]
pub enum Outcome {
    Installed(String, InstallationData),
    Uninstalled(String),
    Aborted(String),
    UninstallAborted(String),
}

/// Prints notifications and remembers completion events so the caller can
/// update the game store.
#[derive(Default)]
pub struct ConsoleHost {
    outcomes: Mutex<Vec<Outcome>>,
}

impl ConsoleHost {
    pub fn take_outcomes(&self) -> Vec<Outcome> {
        std::mem::take(&mut *self.outcomes.lock())
    }
}

impl HostEvents for ConsoleHost {
    fn notify(&self, game_id: &str, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!(game = game_id, "{message}"),
            Severity::Error => error!(game = game_id, "{message}"),
        }
        println!("{message}");
    }

    fn game_installed(&self, game_id: &str, data: InstallationData) {
        self.outcomes
            .lock()
            .push(Outcome::Installed(game_id.to_string(), data));
    }

    fn game_uninstalled(&self, game_id: &str) {
        self.outcomes
            .lock()
            .push(Outcome::Uninstalled(game_id.to_string()));
    }

    fn install_aborted(&self, game_id: &str) {
        self.outcomes.lock().push(Outcome::Aborted(game_id.to_string()));
    }

    fn uninstall_aborted(&self, game_id: &str) {
        self.outcomes
            .lock()
            .push(Outcome::UninstallAborted(game_id.to_string()));
    }
}
