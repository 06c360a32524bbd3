//! Mono delay line for the far-end reference.

use derive_more::Debug;

#[derive(Debug)]
pub(crate) struct RenderBuffer {
    #[debug(skip)]
    samples: Vec<f32>,
    write: usize,
    /// Valid samples, saturating at the capacity.
    filled: usize,
}

impl RenderBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            write: 0,
            filled: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.samples.fill(0.0);
        self.write = 0;
        self.filled = 0;
    }

    pub(crate) fn push(&mut self, frame: &[f32]) {
        let capacity = self.samples.len();
        for &s in frame {
            self.samples[self.write] = s;
            self.write = (self.write + 1) % capacity;
        }
        self.filled = (self.filled + frame.len()).min(capacity);
    }

    /// Fills `dst` with the samples ending `delay` samples before the newest
    /// one. Positions older than anything written read as zero.
    pub(crate) fn read_delayed(&self, delay: usize, dst: &mut [f32]) {
        let capacity = self.samples.len();
        debug_assert!(delay + dst.len() <= capacity);
        let len = dst.len();
        for (i, d) in dst.iter_mut().enumerate() {
            // The newest sample has age 1.
            let age = delay + len - i;
            *d = if age > self.filled {
                0.0
            } else {
                self.samples[(self.write + capacity - age) % capacity]
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_newest_samples_without_delay() {
        let mut buffer = RenderBuffer::new(16);
        buffer.push(&[1.0, 2.0, 3.0, 4.0]);
        let mut dst = [0.0; 3];
        buffer.read_delayed(0, &mut dst);
        assert_eq!(dst, [2.0, 3.0, 4.0]);
    }

    #[test]
    fn delayed_read_pads_with_zeros() {
        let mut buffer = RenderBuffer::new(16);
        buffer.push(&[1.0, 2.0, 3.0]);
        let mut dst = [9.0; 4];
        buffer.read_delayed(2, &mut dst);
        assert_eq!(dst, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn wraps_around() {
        let mut buffer = RenderBuffer::new(4);
        buffer.push(&[1.0, 2.0, 3.0]);
        buffer.push(&[4.0, 5.0, 6.0]);
        let mut dst = [0.0; 4];
        buffer.read_delayed(0, &mut dst);
        assert_eq!(dst, [3.0, 4.0, 5.0, 6.0]);

        buffer.reset();
        buffer.read_delayed(0, &mut dst);
        assert_eq!(dst, [0.0; 4]);
    }
}
