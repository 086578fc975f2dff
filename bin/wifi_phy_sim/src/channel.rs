use num::complex::Complex32;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Additive white gaussian noise for constellations with unit average energy.
pub struct AwgnChannel {
    rng: StdRng,
    noise: Option<Normal<f32>>,
}

impl AwgnChannel {
    /// No noise is added when `snr_db` is `None`.
    pub fn new(snr_db: Option<f32>, seed: u64) -> Result<Self, String> {
        let noise = match snr_db {
            None => None,
            Some(snr_db) => {
                // Half of the noise power goes into each axis
                let sigma = (0.5*10.0f32.powf(-snr_db/10.0)).sqrt();
                let normal = Normal::new(0.0, sigma).map_err(|err| format!("Invalid SNR {}dB: {}", snr_db, err))?;
                Some(normal)
            },
        };
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            noise,
        })
    }

    pub fn process(&mut self, buf: &mut [Complex32]) {
        let Some(noise) = self.noise.as_ref() else {
            return;
        };
        for x in buf.iter_mut() {
            *x += Complex32::new(noise.sample(&mut self.rng), noise.sample(&mut self.rng));
        }
    }
}
