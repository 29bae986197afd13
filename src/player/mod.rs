pub mod audio;
pub mod manager;
pub mod queue;
pub mod session;
pub mod state;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;

pub use audio::{AudioOutput, AudioOutputFactory, FfplayOutput, FfplayOutputFactory};
pub use manager::PlayerManager;
pub use queue::TrackQueue;
pub use session::SessionHandle;
pub use state::{PlaybackState, PlayerEvent, SessionStatus};
pub use track::TrackInfo;
