use anyhow::{bail, Result};
use candle_core::{DType, Tensor, D};

/// Sentence vectors from token states: averages `hidden` (`[B,T,H]`) over
/// the positions `mask` (`[B,T]`) marks, then scales each row to unit length.
pub fn masked_mean_l2(hidden: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let (batch, _, width) = match hidden.dims() {
        &[b, t, h] => (b, t, h),
        other => bail!("expected token states of rank 3, got {other:?}"),
    };
    let weights = mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let summed = hidden.broadcast_mul(&weights.unsqueeze(D::Minus1)?)?.sum(1)?;
    // Rows with no unmasked token stay zero instead of dividing by zero.
    let counts = weights.sum_keepdim(1)?.clamp(1.0, f64::MAX)?;
    let mean = summed.broadcast_div(&counts)?;
    l2_rows(&mean, batch, width)
}

fn l2_rows(rows: &Tensor, batch: usize, width: usize) -> Result<Tensor> {
    let floor = if rows.dtype() == DType::F16 {
        1e-6
    } else {
        1e-12
    };
    let norms = rows.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(floor, f64::MAX)?;
    let out = rows.broadcast_div(&norms)?;
    if out.dims() != [batch, width] {
        bail!("pooled to {:?}, expected [{batch}, {width}]", out.dims());
    }
    Ok(out)
}
