use image::GrayImage;

/// Summed-area tables for intensity and squared intensity.
///
/// Both tables carry a leading zero row and column, so the table is
/// `(width + 1) x (height + 1)` and any rectangle sum is four lookups.
pub(crate) struct IntegralImages {
    stride: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImages {
    pub(crate) fn new(gray: &GrayImage) -> Self {
        let (width, height) = (gray.width() as usize, gray.height() as usize);
        let stride = width + 1;
        let mut sum = vec![0u64; stride * (height + 1)];
        let mut sq_sum = vec![0u64; stride * (height + 1)];

        for y in 0..height {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..width {
                let v = gray.get_pixel(x as u32, y as u32)[0] as u64;
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride] + row_sum;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        Self {
            stride,
            sum,
            sq_sum,
        }
    }

    pub(crate) fn rect_sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        Self::lookup(&self.sum, self.stride, x, y, width, height)
    }

    pub(crate) fn rect_sq_sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        Self::lookup(&self.sq_sum, self.stride, x, y, width, height)
    }

    fn lookup(table: &[u64], stride: usize, x: u32, y: u32, width: u32, height: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + width as usize, y0 + height as usize);
        let a = table[y0 * stride + x0];
        let b = table[y0 * stride + x1];
        let c = table[y1 * stride + x0];
        let d = table[y1 * stride + x1];
        (d + a) - (b + c)
    }
}
