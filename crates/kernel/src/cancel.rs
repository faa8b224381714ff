/// A `tokio::sync::watch::Receiver<bool>` rather than `tokio_util`'s
/// `CancellationToken`, to avoid an extra dependency — the watch channel
/// gives the same "observable from every `tokio::select!`" shape.
pub type CancelSignal = tokio::sync::watch::Receiver<bool>;

pub fn is_cancelled(cancel: &CancelSignal) -> bool {
    *cancel.borrow()
}

/// Paired sender the scheduler holds onto; dropping or flipping it to `true`
/// signals every outstanding job.
pub fn cancel_channel() -> (tokio::sync::watch::Sender<bool>, CancelSignal) {
    tokio::sync::watch::channel(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flipping_the_sender_is_observed_by_every_clone() {
        let (tx, rx) = cancel_channel();
        let rx2 = rx.clone();
        assert!(!is_cancelled(&rx));
        tx.send(true).unwrap();
        assert!(is_cancelled(&rx));
        assert!(is_cancelled(&rx2));
    }
}
