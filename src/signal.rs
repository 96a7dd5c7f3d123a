use std::{io, process, thread};

use libc::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::warn;

use crate::stop::StopFlag;

/// Raises `stop` on the first SIGINT or SIGTERM and exits on the second.
pub fn install(stop: StopFlag) -> io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            for sig in signals.forever() {
                if stop.is_stopped() {
                    warn!(signal = sig, "second signal, exiting");
                    process::exit(128 + sig);
                }
                warn!(signal = sig, "stopping the dinner, press again to exit");
                stop.stop();
            }
        })?;
    Ok(())
}
