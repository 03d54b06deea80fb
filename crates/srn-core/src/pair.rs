//! Left/right view pairs.
//!
//! Every tensor that flows through the stereo network travels as a
//! [`StereoPair`], so the (left, right) order is carried by the type instead
//! of by position in a slice.

/// One of the two camera perspectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Left,
    Right,
}

impl View {
    /// Both views in canonical order.
    pub const BOTH: [View; 2] = [View::Left, View::Right];

    /// Directory / file-name tag of the view.
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Left => "left",
            View::Right => "right",
        }
    }

    /// The opposite view.
    pub fn other(&self) -> View {
        match self {
            View::Left => View::Right,
            View::Right => View::Left,
        }
    }
}

/// A value per view, always in (left, right) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StereoPair<T> {
    pub left: T,
    pub right: T,
}

impl<T> StereoPair<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    /// Apply the same function to each view, left first.
    ///
    /// This is how shared-weight modules are evaluated: one module, two calls.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> StereoPair<U> {
        let left = f(self.left);
        let right = f(self.right);
        StereoPair { left, right }
    }

    /// Fallible [`map`](Self::map); stops at the first error.
    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<StereoPair<U>, E> {
        let left = f(self.left)?;
        let right = f(self.right)?;
        Ok(StereoPair { left, right })
    }

    /// Borrow both views.
    pub fn as_ref(&self) -> StereoPair<&T> {
        StereoPair {
            left: &self.left,
            right: &self.right,
        }
    }

    /// Pair up two per-view values.
    pub fn zip<U>(self, other: StereoPair<U>) -> StereoPair<(T, U)> {
        StereoPair {
            left: (self.left, other.left),
            right: (self.right, other.right),
        }
    }

    /// Exchange the views.
    pub fn swap(self) -> Self {
        Self {
            left: self.right,
            right: self.left,
        }
    }

    pub fn get(&self, view: View) -> &T {
        match view {
            View::Left => &self.left,
            View::Right => &self.right,
        }
    }

    pub fn into_tuple(self) -> (T, T) {
        (self.left, self.right)
    }
}

impl<T> From<(T, T)> for StereoPair<T> {
    fn from((left, right): (T, T)) -> Self {
        Self { left, right }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_preserves_order() {
        let mut calls = Vec::new();
        let pair = StereoPair::new(1, 2).map(|v| {
            calls.push(v);
            v * 10
        });
        assert_eq!(pair, StereoPair::new(10, 20));
        assert_eq!(calls, vec![1, 2]);
    }

    #[test]
    fn test_try_map_short_circuits() {
        let result: Result<StereoPair<i32>, &str> =
            StereoPair::new(1, -1).try_map(|v| if v > 0 { Ok(v) } else { Err("negative") });
        assert_eq!(result, Err("negative"));
    }

    #[test]
    fn test_swap_and_get() {
        let pair = StereoPair::new("l", "r").swap();
        assert_eq!(*pair.get(View::Left), "r");
        assert_eq!(*pair.get(View::Right), "l");
        assert_eq!(View::Left.other(), View::Right);
    }

    #[test]
    fn test_zip_and_tuple() {
        let pair = StereoPair::new(1, 2).zip(StereoPair::new('a', 'b'));
        assert_eq!(pair.into_tuple(), ((1, 'a'), (2, 'b')));
        let from_tuple: StereoPair<u8> = (3, 4).into();
        assert_eq!(from_tuple.left, 3);
    }
}
