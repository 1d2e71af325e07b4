use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    TimeOut(#[from] TimeOutError),
    #[error("controller has not been initialized")]
    NotInitialized,
    #[error(
        "area {width}x{height} at ({x}, {y}) exceeds the {panel_width}x{panel_height} panel"
    )]
    AreaOutOfBounds {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        panel_width: u16,
        panel_height: u16,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("timeout: {:?}, elapsed: {:?}", self.timeout, self.elapsed)]
pub struct TimeOutError {
    pub timeout: Duration,
    pub elapsed: Duration,
}
