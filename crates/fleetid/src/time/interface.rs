/// A trait for wall-clock time sources.
///
/// This abstraction allows you to plug in the real system clock or a mocked
/// time source in tests. Unlike a monotonic timer, implementations are expected
/// to follow wall-clock adjustments: regressions must stay observable so the
/// generator can refuse to issue IDs while the clock runs backwards.
///
/// # Example
///
/// ```
/// use fleetid::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1_700_000_000_123
///     }
/// }
///
/// let time = FixedTime;
/// assert_eq!(time.current_millis(), 1_700_000_000_123);
/// assert_eq!(time.current_seconds(), 1_700_000_000);
/// ```
pub trait TimeSource: Send + Sync {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn current_millis(&self) -> u64;

    /// Returns the current time in whole seconds since the Unix epoch.
    fn current_seconds(&self) -> u64 {
        self.current_millis() / 1_000
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}
