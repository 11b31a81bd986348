use rand::rngs::StdRng;
use rand::Rng;

/// Uniform white noise in `[-amplitude, amplitude)`.
pub fn white_noise(rng: &mut StdRng, length: usize, amplitude: f64) -> Vec<f64> {
    if amplitude <= 0.0 {
        return vec![0.0; length];
    }
    (0..length)
        .map(|_| rng.gen_range(-amplitude..amplitude))
        .collect()
}

/// `samples` scaled by `gain` and shifted late by `delay` samples, zero-filled at the start.
pub fn delayed(samples: &[f64], delay: usize, gain: f64) -> Vec<f64> {
    let delay = delay.min(samples.len());
    std::iter::repeat(0.0)
        .take(delay)
        .chain(samples[..samples.len() - delay].iter().map(|v| v * gain))
        .collect()
}

/// Single-epoch RESP text describing a flat displacement response.
pub fn flat_resp(network: &str, station: &str, location: &str, channel: &str, year: i32) -> String {
    format!(
        "#\n\
         B050F03     Station:     {station}\n\
         B050F16     Network:     {network}\n\
         B052F03     Location:    {location}\n\
         B052F04     Channel:     {channel}\n\
         B052F22     Start date:  {year},001,00:00:00.0000\n\
         B052F23     End date:    No Ending Time\n\
         B053F03     Transfer function type:                A [Laplace Transform (Rad/sec)]\n\
         B053F04     Stage sequence number:                 1\n\
         B053F05     Response in units lookup:              M - Displacement in Meters\n\
         B053F06     Response out units lookup:             V - Volts\n\
         B053F07     A0 normalization factor:               +1.00000E+00\n\
         B053F08     Normalization frequency:               +1.00000E+00\n\
         B053F09     Number of zeroes:                      0\n\
         B053F14     Number of poles:                       0\n\
         B058F03     Stage sequence number:                 0\n\
         B058F04     Sensitivity:                           +1.00000E+00\n\
         B058F05     Frequency of sensitivity:              +1.00000E+00 HZ\n"
    )
}
