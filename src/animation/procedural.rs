use crate::foundation::error::{MotionResult, ensure_finite};

/// Periodic waveform family.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Waveform {
    #[default]
    Sine,
    /// Seeded value noise: one random level per unit of phase, linearly interpolated.
    Noise1d { seed: u64 },
}

/// Static configuration of a procedural motion node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProceduralSpec {
    pub waveform: Waveform,
    /// Radians of phase per unit of progress.
    pub frequency: f64,
    pub phase_offset: f64,
    pub amplitude: f64,
}

impl ProceduralSpec {
    pub fn sine(frequency: f64, phase_offset: f64, amplitude: f64) -> MotionResult<Self> {
        Self::new(Waveform::Sine, frequency, phase_offset, amplitude)
    }

    pub fn noise(seed: u64, frequency: f64, amplitude: f64) -> MotionResult<Self> {
        Self::new(Waveform::Noise1d { seed }, frequency, 0.0, amplitude)
    }

    pub fn new(
        waveform: Waveform,
        frequency: f64,
        phase_offset: f64,
        amplitude: f64,
    ) -> MotionResult<Self> {
        Ok(Self {
            waveform,
            frequency: ensure_finite("procedural frequency", frequency)?,
            phase_offset: ensure_finite("procedural phaseOffset", phase_offset)?,
            amplitude: ensure_finite("procedural amplitude", amplitude)?,
        })
    }

    /// The half-cycle partner of this spec, for reciprocal motion sharing one input.
    pub fn opposing(&self) -> Self {
        Self {
            phase_offset: self.phase_offset + std::f64::consts::PI,
            ..*self
        }
    }

    pub fn generate(&self, progress: f64) -> f64 {
        generate(progress, self)
    }
}

/// `amplitude * wave(progress * frequency + phase_offset)`. Pure: equal arguments give
/// bit-identical results, and the output lies in `[-|amplitude|, |amplitude|]`.
pub fn generate(progress: f64, spec: &ProceduralSpec) -> f64 {
    let phase = progress * spec.frequency + spec.phase_offset;
    let wave = match spec.waveform {
        Waveform::Sine => phase.sin(),
        Waveform::Noise1d { seed } => value_noise(seed, phase),
    };
    spec.amplitude * wave
}

#[derive(Clone, Copy, Debug)]
struct Rng64 {
    state: u64,
}

impl Rng64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        // SplitMix64
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in `[-1, 1)` with 53 bits of precision.
    fn next_signed_unit(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) * (2.0 / ((1u64 << 53) as f64)) - 1.0
    }
}

fn lattice(seed: u64, cell: i64) -> f64 {
    let mut rng = Rng64::new(seed ^ (cell as u64).wrapping_mul(0xD6E8_FEB8_6659_FD93));
    rng.next_signed_unit()
}

fn value_noise(seed: u64, x: f64) -> f64 {
    if !x.is_finite() {
        return f64::NAN;
    }
    let x0 = x.floor();
    let t = x - x0;
    let cell = x0 as i64;
    let a = lattice(seed, cell);
    let b = lattice(seed, cell.wrapping_add(1));
    a + (b - a) * t
}
