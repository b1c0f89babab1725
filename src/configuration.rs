use crate::{error::Result, slots::SlotSequence};
use std::path::PathBuf;

pub trait Configuration: Clone + Send + Sync + 'static {
    fn port(&self) -> u16;
    /// JSON file holding the booking records. `None` keeps everything in memory.
    fn data_file(&self) -> Option<PathBuf>;
    fn slot_sequence(&self) -> Result<SlotSequence>;
}
