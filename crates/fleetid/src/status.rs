use crate::FleetId;

/// Represents the result of attempting to generate a new ID.
///
/// This type models the outcome of [`Generator::try_generate`]:
///
/// - [`IdGenStatus::Ready`] indicates a new ID was successfully generated.
/// - [`IdGenStatus::Pending`] means the sequence wrapped inside the current
///   millisecond and the guard refuses to emit an ID that would sort below its
///   predecessor until the clock advances.
///
/// # Example
///
/// ```
/// use fleetid::{Generator, GeneratorConfig, IdGenStatus};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> fleetid::Result<()> {
/// let generator = Generator::new(GeneratorConfig::standalone().with_worker_id(7));
/// generator.initialize().await?;
///
/// match generator.try_generate()? {
///     IdGenStatus::Ready { id } => println!("ID: {id} (worker {})", id.worker_id()),
///     IdGenStatus::Pending { yield_for } => println!("back off for {yield_for} ms"),
/// }
/// # Ok(())
/// # }
/// ```
///
/// [`Generator::try_generate`]: crate::Generator::try_generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdGenStatus {
    /// A unique ID was generated and is ready to use.
    Ready {
        /// The generated ID.
        id: FleetId,
    },
    /// No ID could be generated without reusing a sequence value in the
    /// current millisecond.
    Pending {
        /// Milliseconds to wait before trying again.
        yield_for: u64,
    },
}

/// Non-error outcome of [`Generator::initialize`].
///
/// [`Generator::initialize`]: crate::Generator::initialize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// This call performed registration and skew checks and moved the handle
    /// to [`Lifecycle::Ready`].
    Initialized,
    /// The handle was already ready; nothing was re-run.
    AlreadyInitialized,
}

/// Lifecycle of a [`Generator`](crate::Generator) handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Lifecycle {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
}

impl Lifecycle {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Initializing,
            2 => Self::Ready,
            _ => Self::Uninitialized,
        }
    }
}
