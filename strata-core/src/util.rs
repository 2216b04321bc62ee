//! Utility types, used throughout the crate.

/// An opacity in `[0, 1]`, never NaN.
// Because of the preconditions invalidating many bitpatterns, this is not Pod.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "f32", into = "f32")]
#[repr(transparent)]
pub struct Opacity(f32);
impl Opacity {
    pub const TRANSPARENT: Self = Self(0.0);
    pub const OPAQUE: Self = Self(1.0);
    pub fn new(val: f32) -> Result<Self, OpacityError> {
        if !val.is_finite() {
            Err(OpacityError::NotFinite)
        } else if !(0.0..=1.0).contains(&val) {
            Err(OpacityError::OutOfRange)
        } else {
            Ok(Self(val))
        }
    }
    /// Clamp any finite value into range. NaN becomes fully transparent.
    #[must_use]
    pub fn saturating(val: f32) -> Self {
        if val.is_nan() {
            Self::TRANSPARENT
        } else {
            Self(val.clamp(0.0, 1.0))
        }
    }
    #[must_use]
    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for Opacity {
    fn default() -> Self {
        Self::OPAQUE
    }
}

impl TryFrom<f32> for Opacity {
    type Error = OpacityError;
    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
impl From<Opacity> for f32 {
    fn from(value: Opacity) -> Self {
        value.get()
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpacityError {
    #[error("not finite")]
    NotFinite,
    #[error("outside of [0, 1]")]
    OutOfRange,
}

// Never NaN, so PartialEq can act like Eq
impl Eq for Opacity {}
impl std::hash::Hash for Opacity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u32(self.0.to_bits());
    }
}

/// Width and height of a canvas or buffer, in pixels.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}
impl Size {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
    #[must_use]
    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
    #[must_use]
    pub fn of_image<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self::new(image.width(), image.height())
    }
    /// Check that `found` matches `self`.
    pub fn expect(self, found: Size) -> Result<(), DimensionMismatch> {
        if self == found {
            Ok(())
        } else {
            Err(DimensionMismatch {
                expected: self,
                found,
            })
        }
    }
}
impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Operands of differing dimensions were combined.
///
/// Indicates a canvas/selection desync upstream, and is not recoverable.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("dimension mismatch: expected {expected}, found {found}")]
pub struct DimensionMismatch {
    pub expected: Size,
    pub found: Size,
}

/// Axis-aligned pixel rectangle. `x + width` and `y + height` are exclusive.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
impl Rect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
    /// The rect covering all of `size`.
    #[must_use]
    pub const fn of_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }
    /// Construct from inclusive-exclusive corners. Returns an empty rect if inverted.
    #[must_use]
    pub fn from_corners(min: [u32; 2], max: [u32; 2]) -> Self {
        Self::new(
            min[0],
            min[1],
            max[0].saturating_sub(min[0]),
            max[1].saturating_sub(min[1]),
        )
    }
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }
    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
    #[must_use]
    pub fn area(&self) -> u64 {
        self.size().area()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }
    /// Does this rect lie entirely inside `size`?
    #[must_use]
    pub fn fits_within(&self, size: Size) -> bool {
        self.right() <= size.width && self.bottom() <= size.height
    }
    /// Smallest rect containing both. Empty rects are ignored.
    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_corners(
            [self.x.min(other.x), self.y.min(other.y)],
            [
                self.right().max(other.right()),
                self.bottom().max(other.bottom()),
            ],
        )
    }
    /// Overlap of the two rects, or None if they don't touch.
    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let rect = Rect::from_corners(
            [self.x.max(other.x), self.y.max(other.y)],
            [
                self.right().min(other.right()),
                self.bottom().min(other.bottom()),
            ],
        );
        (!rect.is_empty()).then_some(rect)
    }
}

/// Milliseconds since the unix epoch, as attached to every operation.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Timestamp(pub u64);
impl Timestamp {
    #[must_use]
    pub fn now() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        // Clocks before 1970 are someone else's problem.
        Self(u64::try_from(millis).unwrap_or(0))
    }
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }
    #[must_use]
    pub fn millis(self) -> u64 {
        self.0
    }
    /// Milliseconds from `earlier` to `self`, or None if `earlier` is actually later.
    #[must_use]
    pub fn millis_since(self, earlier: Timestamp) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

static REVISION_SERVER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

/// A content revision. Every mutation of a buffer or tree node is stamped with a fresh one,
/// so equal revisions imply equal content within this execution of the program.
///
/// Do NOT persist these - they are only meaningful within one process.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Revision(std::num::NonZeroU64);
impl Revision {
    /// Allocate a never-before-seen revision.
    #[must_use]
    pub fn next() -> Self {
        // We don't care about ordering between threads, only uniqueness.
        let id = REVISION_SERVER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        // Would take centuries of continuous edits to wrap.
        Self(std::num::NonZeroU64::new(id).unwrap_or(std::num::NonZeroU64::MIN))
    }
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}
impl Default for Revision {
    fn default() -> Self {
        Self::next()
    }
}
