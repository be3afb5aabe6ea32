//! Background tasks servicing a process's stream bindings
//!
//! Every pump runs on its own thread from the moment the process is started,
//! so pipes are read and stdin is written whether or not anyone is waiting on
//! the [`RunningCommand`](crate::RunningCommand) yet.

use async_channel::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::resolve::Pump;

/// Handle to a pump running in the background
pub(crate) struct PumpTask {
    done: Receiver<Result<()>>,
    // Dropping this closes the channel the task listens on for cancellation
    _stop: Option<Sender<()>>,
}

impl PumpTask {
    /// Run `pump` to completion in the background, even if the handle is dropped
    pub(crate) fn spawn(name: &str, pump: Pump) -> Result<Self> {
        let done = run_detached(name, pump)?;
        Ok(Self { done, _stop: None })
    }

    /// Run `pump` in the background until it finishes or the handle is dropped
    pub(crate) fn spawn_cancellable(name: &str, pump: Pump) -> Result<Self> {
        let (stop, stopped) = async_channel::bounded::<()>(1);
        let pump: Pump = Box::pin(futures_lite::future::or(pump, async move {
            // Never sent on; resolves once the sender is dropped
            let _ = stopped.recv().await;
            Ok(())
        }));

        let done = run_detached(name, pump)?;
        Ok(Self {
            done,
            _stop: Some(stop),
        })
    }

    /// Wait for the pump to finish
    pub(crate) async fn join(self) -> Result<()> {
        match self.done.recv().await {
            Ok(result) => result,
            Err(_) => Err(pump_panicked()),
        }
    }

    /// The pump's result if it already finished.
    ///
    /// An unfinished cancellable pump is stopped when this returns `None`.
    pub(crate) fn finished(self) -> Option<Result<()>> {
        match self.done.try_recv() {
            Ok(result) => Some(result),
            Err(async_channel::TryRecvError::Empty) => None,
            Err(async_channel::TryRecvError::Closed) => Some(Err(pump_panicked())),
        }
    }
}

fn run_detached(name: &str, pump: Pump) -> Result<Receiver<Result<()>>> {
    let (tx, done) = async_channel::bounded(1);
    std::thread::Builder::new()
        .name(format!("{name}-pump"))
        .spawn(move || {
            let result = futures_lite::future::block_on(pump);
            let _ = tx.try_send(result);
        })?;
    Ok(done)
}

fn pump_panicked() -> Error {
    Error::Io(std::io::Error::other("stream pump stopped unexpectedly"))
}
