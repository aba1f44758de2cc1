use tokio::sync::watch::{self, Receiver, Sender, error::RecvError};

/// Coalescing wake-up signal.
///
/// Any number of [`Trigger::notify`] calls between two [`Waiter::next`] wake
/// the waiter once. Notifying never blocks.
pub struct Trigger {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Trigger {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(());
        Self { tx, rx }
    }

    pub fn notify(&self) {
        self.tx.send_replace(());
    }

    /// New waiter. Notifications sent before this call are not lost: the
    /// waiter starts from the channel's initial state.
    pub fn waiter(&self) -> Waiter {
        Waiter {
            rx: self.rx.clone(),
        }
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Waiter {
    rx: Receiver<()>,
}

impl Waiter {
    pub async fn next(&mut self) -> Result<(), RecvError> {
        self.rx.changed().await?;
        self.rx.borrow_and_update();
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}
