use crate::{Error, Result};

/// Ordered sequence of fixed-length grayscale frame descriptors.
///
/// Each descriptor is a `width * height` intensity vector in row-major order. Descriptors are
/// stored back to back in a single buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSignal {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl FrameSignal {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: Vec::new(),
        }
    }

    /// Builds a signal from a list of descriptors of equal length.
    ///
    /// The descriptors are treated as a single row, i.e. `width = descriptor length` and
    /// `height = 1`.
    pub fn from_descriptors(descriptors: &[Vec<f32>]) -> Result<Self> {
        let len = descriptors.first().map(Vec::len).unwrap_or(0);
        let mut signal = Self::new(len as u32, 1);
        for d in descriptors {
            signal.push(d)?;
        }
        Ok(signal)
    }

    /// Appends one descriptor.
    pub fn push(&mut self, descriptor: &[f32]) -> Result<()> {
        if descriptor.len() != self.descriptor_len() {
            return Err(Error::InvalidConfig(format!(
                "descriptor length mismatch: expected={} got={}",
                self.descriptor_len(),
                descriptor.len()
            )));
        }
        self.data.extend_from_slice(descriptor);
        Ok(())
    }

    /// Appends a tightly packed 8-bit grayscale image.
    pub fn push_gray(&mut self, pixels: &[u8]) -> Result<()> {
        if pixels.len() != self.descriptor_len() {
            return Err(Error::InvalidConfig(format!(
                "frame size mismatch: expected={} got={}",
                self.descriptor_len(),
                pixels.len()
            )));
        }
        self.data.extend(pixels.iter().map(|p| *p as f32));
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of elements in each descriptor.
    pub fn descriptor_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        match self.descriptor_len() {
            0 => 0,
            n => self.data.len() / n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn descriptor(&self, idx: usize) -> Option<&[f32]> {
        let n = self.descriptor_len();
        self.data.get(idx * n..(idx + 1) * n)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &[f32]> {
        // `chunks_exact` panics on zero, and a zero-sized descriptor holds no data anyway.
        self.data.chunks_exact(self.descriptor_len().max(1))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_push_and_index() {
        let mut signal = FrameSignal::new(2, 2);
        assert!(signal.is_empty());
        signal.push_gray(&[0, 1, 2, 3]).unwrap();
        signal.push(&[4.0, 5.0, 6.0, 7.0]).unwrap();
        assert_eq!(signal.len(), 2);
        assert_eq!(signal.descriptor(1), Some(&[4.0, 5.0, 6.0, 7.0][..]));
        assert_eq!(signal.descriptor(2), None);
        assert_eq!(signal.descriptors().count(), 2);
    }

    #[test]
    fn test_size_mismatch() {
        let mut signal = FrameSignal::new(160, 120);
        assert_eq!(signal.descriptor_len(), 19200);
        assert!(signal.push_gray(&[0; 100]).is_err());
        assert!(signal.push(&[0.0; 19201]).is_err());
        assert!(signal.is_empty());
    }

    #[test]
    fn test_from_descriptors() {
        let signal = FrameSignal::from_descriptors(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(signal.len(), 2);
        assert!(FrameSignal::from_descriptors(&[vec![1.0], vec![1.0, 2.0]]).is_err());
        assert!(FrameSignal::from_descriptors(&[]).unwrap().is_empty());
    }
}
