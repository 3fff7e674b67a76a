//! Real-signal FFT helpers on top of `rustfft`
//!
//! `rustfft` works on complex buffers and does not normalize, so the real
//! transforms here build the Hermitian-symmetric buffer explicitly and
//! divide the inverse by `n`.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// One-sided spectrum of a real signal (`n / 2 + 1` bins)
pub fn rfft(signal: &[f64]) -> Vec<Complex<f64>> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }

    let mut buffer: Vec<Complex<f64>> = signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    buffer.truncate(n / 2 + 1);
    buffer
}

/// Inverse of [`rfft`] producing `n` real samples.
///
/// Uses the first `n / 2 + 1` bins of `spectrum` (zero-padded if shorter).
/// Imaginary parts of the DC bin, and of the Nyquist bin for even `n`,
/// are ignored.
pub fn irfft(spectrum: &[Complex<f64>], n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }

    let bin = |k: usize| spectrum.get(k).copied().unwrap_or_default();

    let mut buffer = vec![Complex::new(0.0, 0.0); n];
    buffer[0] = Complex::new(bin(0).re, 0.0);
    for k in 1..=(n - 1) / 2 {
        let value = bin(k);
        buffer[k] = value;
        buffer[n - k] = value.conj();
    }
    if n % 2 == 0 {
        buffer[n / 2] = Complex::new(bin(n / 2).re, 0.0);
    }

    let mut planner = FftPlanner::<f64>::new();
    let ifft = planner.plan_fft_inverse(n);
    ifft.process(&mut buffer);

    let norm = 1.0 / n as f64;
    buffer.iter().map(|c| c.re * norm).collect()
}

/// Bin frequencies of [`rfft`] for `n` samples taken at `fs`
pub fn rfftfreq(n: usize, fs: f64) -> Vec<f64> {
    (0..n / 2 + 1).map(|k| k as f64 * fs / n as f64).collect()
}

/// One-sided power spectral density estimate with a rectangular window and
/// no detrending. Returns `(f, psd)`.
pub fn periodogram(signal: &[f64], fs: f64) -> (Vec<f64>, Vec<f64>) {
    let n = signal.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }

    let scale = 1.0 / (fs * n as f64);
    let mut psd: Vec<f64> = rfft(signal)
        .iter()
        .map(|c| c.norm_sqr() * scale)
        .collect();

    // Fold negative frequencies; the Nyquist bin of an even length is unpaired.
    let last = psd.len() - 1;
    let end = if n % 2 == 0 { last } else { last + 1 };
    for p in psd.iter_mut().take(end).skip(1) {
        *p *= 2.0;
    }

    (rfftfreq(n, fs), psd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    #[test]
    fn test_round_trip_even_and_odd() {
        for n in [16usize, 17] {
            let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.7).sin() + 0.1 * i as f64).collect();
            let back = irfft(&rfft(&x), n);
            for (a, b) in x.iter().zip(back.iter()) {
                assert!((a - b).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_periodogram_of_sinusoid() {
        let fs = 64.0;
        let n = 256;
        let x: Vec<f64> = (0..n).map(|i| (TAU * 4.0 * i as f64 / fs).sin()).collect();
        let (f, p) = periodogram(&x, fs);
        assert_eq!(f.len(), n / 2 + 1);

        let peak = p
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert!((f[peak.0] - 4.0).abs() < 1e-12);

        // Parseval: integrated one-sided density equals mean power (0.5)
        let df = fs / n as f64;
        let power: f64 = p.iter().sum::<f64>() * df;
        assert!((power - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rfftfreq_spacing() {
        let f = rfftfreq(10, 5.0);
        assert_eq!(f.len(), 6);
        assert!((f[5] - 2.5).abs() < 1e-12);
    }
}
