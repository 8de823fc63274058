use std::time::Duration;

pub const HELP_TEXT: &str = "!help   Shows this help.
!start  Starts your adventure, or resumes it from your last save.
!save   Saves your adventure and ends the game until you write again.";

pub const SAVED_TEXT: &str = "Game saved. Write anything to continue where you left off.";

pub const NO_GAME_TEXT: &str = "No adventure is running. Type !start to begin.";

pub const ALREADY_RUNNING_TEXT: &str = "Your adventure is already running.";

pub fn welcome_text(idle_timeout: Duration) -> String {
    let minutes = (idle_timeout.as_secs() / 60).max(1);
    format!(
        "Welcome traveler. You have found the fabled and famed open adventure bot.
To start a new adventure type !start
Once you started your adventure just type regularly (without '!') in order to interact with your surroundings.
You can also type !help to see what else I can do for you.
A note on your score: I will save your game after you have not typed anything for {minutes} minutes. \
This will result in a score loss of 5 points. So for the best score you must keep playing."
    )
}

pub fn unknown_command_text(name: &str) -> String {
    format!("I don't know the command {name}. Type !help for a list.")
}
