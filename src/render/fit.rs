use crate::error::FitError;

/// Bounds the reported terminal width to `[min, max]`.
pub fn clamp_width(columns: usize, min: usize, max: usize) -> usize {
    columns.max(min).min(max)
}

/// Decimates `profile` to exactly `width - trim` samples.
///
/// Every `step`-th bin is kept starting at bin 0, with
/// `step = max(1, len / (width - trim))`. Longer results are truncated; a
/// profile too short to fill the row is padded with silence.
pub fn fit_row(profile: &[f32], width: usize, trim: usize) -> Result<Vec<f32>, FitError> {
    let target = width
        .checked_sub(trim)
        .filter(|&t| t > 0)
        .ok_or(FitError::InsufficientWidth { width, trim })?;

    let step = (profile.len() / target).max(1);
    let mut row: Vec<f32> = profile.iter().step_by(step).take(target).copied().collect();
    row.resize(target, 0.0);
    Ok(row)
}
