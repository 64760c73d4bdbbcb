/// Observer for running-set changes.
///
/// The host calls this with the full ordered list of running slot
/// indices every time membership changes, including changes it did not
/// initiate itself (state restoration, power loss). There is no diff;
/// consumers re-derive per-slot on/off state from the list.
pub trait NotificationSink: Send + Sync {
    fn services_changed(&self, indices: &[usize]);
}

impl<F> NotificationSink for F
where
    F: Fn(&[usize]) + Send + Sync,
{
    fn services_changed(&self, indices: &[usize]) {
        self(indices)
    }
}

/// Sink that discards notifications, for hosts without an observer.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn services_changed(&self, _indices: &[usize]) {}
}
