/// A closed range of scalars, used for ray parameters and data value ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    /// Create a new interval given min and max values.
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Returns the size of the interval (max - min).
    pub fn size(&self) -> f32 {
        self.max - self.min
    }

    /// Returns true if x is within the interval [min, max] (inclusive).
    pub fn contains(&self, x: f32) -> bool {
        self.min <= x && x <= self.max
    }

    /// Returns true if the interval contains nothing.
    pub fn is_empty(&self) -> bool {
        self.max < self.min
    }

    /// Clamps x to be within the interval [min, max].
    pub fn clamp(&self, x: f32) -> f32 {
        x.clamp(self.min, self.max)
    }

    /// Expands the interval by delta/2 on each side.
    pub fn expand(&self, delta: f32) -> Interval {
        let padding = delta / 2.0;
        Interval::new(self.min - padding, self.max + padding)
    }

    /// Grow the interval so it contains `x`.
    pub fn include(&self, x: f32) -> Interval {
        Interval::new(self.min.min(x), self.max.max(x))
    }

    /// Map `x` into [0, 1] relative to this interval.
    ///
    /// Degenerate intervals map everything to 0.
    pub fn normalize(&self, x: f32) -> f32 {
        let size = self.size();
        if size <= f32::EPSILON {
            return 0.0;
        }
        ((x - self.min) / size).clamp(0.0, 1.0)
    }

    /// Creates an interval that surrounds two other intervals.
    pub fn surrounding(a: &Interval, b: &Interval) -> Interval {
        Interval::new(a.min.min(b.min), a.max.max(b.max))
    }

    /// Range of a set of values; EMPTY for an empty iterator.
    pub fn from_values<I: IntoIterator<Item = f32>>(values: I) -> Interval {
        values
            .into_iter()
            .fold(Interval::EMPTY, |range, v| range.include(v))
    }

    /// An empty interval (min > max, contains nothing).
    pub const EMPTY: Interval = Interval {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_contains() {
        let interval = Interval::new(0.0, 10.0);

        assert!(interval.contains(0.0));
        assert!(interval.contains(10.0));
        assert!(interval.contains(5.0));
        assert!(!interval.contains(-0.1));
        assert!(!interval.contains(10.1));
    }

    #[test]
    fn test_interval_expand() {
        let expanded = Interval::new(0.0, 10.0).expand(4.0);

        assert_eq!(expanded.min, -2.0);
        assert_eq!(expanded.max, 12.0);
    }

    #[test]
    fn test_interval_from_values() {
        let range = Interval::from_values([3.0, -1.0, 7.5, 2.0]);
        assert_eq!(range, Interval::new(-1.0, 7.5));

        let empty = Interval::from_values(std::iter::empty());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_interval_normalize() {
        let range = Interval::new(10.0, 20.0);
        assert_eq!(range.normalize(10.0), 0.0);
        assert_eq!(range.normalize(15.0), 0.5);
        assert_eq!(range.normalize(30.0), 1.0);

        // Constant data should not divide by zero
        assert_eq!(Interval::new(4.0, 4.0).normalize(4.0), 0.0);
    }

    #[test]
    fn test_interval_empty() {
        let empty = Interval::EMPTY;

        assert!(empty.is_empty());
        assert!(!empty.contains(0.0));
        assert!(!empty.contains(f32::INFINITY));
    }
}
