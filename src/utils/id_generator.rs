//! Monotonic identifier allocation
//!
//! Identifiers are handed out starting at `RESERVED_ID + 1` and wrap back to
//! the start after the maximum representable value. [`RESERVED_ID`] itself is
//! never returned, which lets it double as the "all requests" wildcard on the
//! cancel path.

/// The identifier value that is never allocated
pub const RESERVED_ID: i32 = 0;

/// Integer types usable as router identifiers
pub trait RouterId: Copy + Eq + std::fmt::Debug {
    /// The reserved sentinel for this width
    const RESERVED: Self;
    /// The largest representable value
    const MAX: Self;

    fn increment(self) -> Self;
}

macro_rules! impl_router_id {
    ($($ty:ty),*) => {
        $(
            impl RouterId for $ty {
                const RESERVED: Self = 0;
                const MAX: Self = <$ty>::MAX;

                fn increment(self) -> Self {
                    self + 1
                }
            }
        )*
    };
}

impl_router_id!(i32, i64, u32, u64);

/// Hands out identifiers for one id space. Not thread-safe: each router owns
/// its generators and only touches them from its own thread.
#[derive(Debug, Clone)]
pub struct IdGenerator<T: RouterId> {
    last: T,
}

impl<T: RouterId> IdGenerator<T> {
    /// Create a generator whose first id is `RESERVED + 1`
    pub fn new() -> Self {
        Self { last: T::RESERVED }
    }

    /// Allocate the next identifier
    pub fn next_id(&mut self) -> T {
        if self.last == T::MAX {
            self.last = T::RESERVED;
        }
        self.last = self.last.increment();
        self.last
    }
}

impl<T: RouterId> Default for IdGenerator<T> {
    fn default() -> Self {
        Self::new()
    }
}
