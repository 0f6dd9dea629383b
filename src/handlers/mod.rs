pub mod config;
pub mod meetings;
pub mod transcription;
pub mod webhooks;

pub use self::config::*;
pub use self::meetings::*;
pub use self::transcription::*;
pub use self::webhooks::*;
