// Automation actions a host can apply to a LocalImage.
// Results are not returned; they surface through the next poll().

use alloc::string::String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageAction {
    /// Change the path; takes effect on the next load.
    SetPath(String),
    /// Change the path, then load it.
    Reload(String),
    /// Free the pixel buffer.
    Release,
    /// Load the current path again.
    Load,
}

impl ImageAction {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetPath(_) => "set_path",
            Self::Reload(_) => "reload",
            Self::Release => "release",
            Self::Load => "load",
        }
    }
}
