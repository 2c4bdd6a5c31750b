pub mod migrate;
pub mod progress_ui;
pub mod prompts;
