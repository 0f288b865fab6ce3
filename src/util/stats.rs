use std::fmt::{self, Display};

/// Summary of a distribution of counts, such as BVH leaf fills, leaf depths or
/// rays traced per render thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stats {
    pub count: usize,
    pub min: usize,
    pub max: usize,
    /// Exact sum of the samples, the average is derived from it.
    pub total: u64,
}

impl Stats {
    pub fn add_sample(&mut self, value: usize) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.total += value as u64;
    }

    pub fn add_samples(&mut self, values: impl IntoIterator<Item = usize>) {
        for value in values {
            self.add_sample(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Zero when there are no samples.
    pub fn avg(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.total as f64 / self.count as f64
        }
    }

    /// Ratio of the largest sample to the average, 1 for a perfectly even distribution.
    /// Used to spot unbalanced trees or idle threads.
    pub fn imbalance(&self) -> f64 {
        let avg = self.avg();
        if avg > 0.0 { self.max as f64 / avg } else { 1.0 }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            count: 0,
            min: usize::MAX,
            max: 0,
            total: 0,
        }
    }
}

impl FromIterator<usize> for Stats {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut stats = Stats::default();
        stats.add_samples(iter);
        stats
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no samples");
        }
        write!(
            f,
            "{} - {}; avg {:.1}; {} samples",
            self.min,
            self.max,
            self.avg(),
            self.count
        )
    }
}
