use std::sync::mpsc;

/// Transition request applied by the driver on its next tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackCommand {
    /// Start or resume.
    Play,
    /// Hold the current frame.
    Pause,
    /// Stop and rewind to frame 0.
    Stop,
    /// Jump to a frame, clamped to the known range.
    Seek(usize),
}

/// Cloneable handle for steering a driver from other threads.
///
/// Commands queue up and take effect at the start of the driver's next `advance`, so the driver's
/// state is never mutated from outside its own tick.
#[derive(Clone, Debug)]
pub struct PlaybackControl {
    tx: mpsc::Sender<PlaybackCommand>,
}

impl PlaybackControl {
    pub(crate) fn new(tx: mpsc::Sender<PlaybackCommand>) -> Self {
        Self { tx }
    }

    /// Queue a command. Returns `false` once the driver is gone.
    pub fn send(&self, cmd: PlaybackCommand) -> bool {
        self.tx.send(cmd).is_ok()
    }

    /// Queue [`PlaybackCommand::Play`].
    pub fn play(&self) -> bool {
        self.send(PlaybackCommand::Play)
    }

    /// Queue [`PlaybackCommand::Pause`].
    pub fn pause(&self) -> bool {
        self.send(PlaybackCommand::Pause)
    }

    /// Queue [`PlaybackCommand::Stop`].
    pub fn stop(&self) -> bool {
        self.send(PlaybackCommand::Stop)
    }

    /// Queue [`PlaybackCommand::Seek`].
    pub fn seek(&self, index: usize) -> bool {
        self.send(PlaybackCommand::Seek(index))
    }
}
