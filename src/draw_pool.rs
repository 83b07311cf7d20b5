use std::collections::VecDeque;

/// Random selector that avoids recent repeats.
///
/// Drawn elements move to a discard queue; once the queue holds more than
/// `max(1, ratio × N)` entries its oldest entry returns to the draw set. An
/// element therefore cannot come back within that many draws.
#[derive(Debug, Clone)]
pub struct NonRepeatingRandomizer<T> {
    available: Vec<T>,
    discarded: VecDeque<T>,
    window: usize,
}

impl<T: Clone> NonRepeatingRandomizer<T> {
    /// Returns `None` for fewer than 2 elements or a ratio outside (0, 1].
    pub fn new(elements: Vec<T>, avoid_repeats_ratio: f64) -> Option<Self> {
        let count = elements.len();
        if count < 2 || !(avoid_repeats_ratio > 0.0 && avoid_repeats_ratio <= 1.0) {
            return None;
        }
        // Keep at least one element drawable.
        let window = ((avoid_repeats_ratio * count as f64).floor() as usize)
            .max(1)
            .min(count - 1);
        Some(NonRepeatingRandomizer {
            available: elements,
            discarded: VecDeque::with_capacity(window + 1),
            window,
        })
    }

    pub fn next(&mut self, rng: &mut fastrand::Rng) -> T {
        let idx = rng.usize(..self.available.len());
        let picked = self.available.remove(idx);
        self.discarded.push_back(picked.clone());
        if self.discarded.len() > self.window {
            if let Some(returned) = self.discarded.pop_front() {
                self.available.push(returned);
            }
        }
        picked
    }

    /// Total number of elements in the pool.
    pub fn len(&self) -> usize {
        self.available.len() + self.discarded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of draws an element is held back after being picked.
    pub fn window(&self) -> usize {
        self.window
    }
}
