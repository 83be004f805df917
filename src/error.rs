// Setup-time error type. `Session::setup` stays tolerant by default (it logs
// and carries on, per the fault-tolerant boot path a real firmware loader
// would want), but `Session::try_setup_strict` surfaces these for embedders
// that would rather fail fast.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("font atlas is empty")]
    FontMissing,
    #[error("kernel image is empty")]
    RomMissing,
    #[error("kernel image ({rom_len} bytes) does not fit in {ram_size}-byte RAM")]
    RomTooLarge { rom_len: usize, ram_size: usize },
}
