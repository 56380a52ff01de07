use egui::{Color32, Pos2, Vec2, pos2, vec2};
use frand::Rand;
use palette::{Srgb, WithAlpha};

pub const PARTICLE_COUNT: usize = 50;
const MAX_SPEED: f32 = 0.25; // px per frame, per axis
const MIN_RADIUS: f32 = 1.0;
const MAX_RADIUS: f32 = 3.0;
const MIN_OPACITY: f32 = 0.1;
const MAX_OPACITY: f32 = 0.6;

fn neon_colors() -> [Srgb<u8>; 2] {
    [
        Srgb::new(0x00, 0xf3, 0xff), // cyan
        Srgb::new(0xff, 0x00, 0xff), // magenta
    ]
}

#[derive(Clone, Copy, Debug)]
pub struct Particle {
    pub pos: Pos2,
    pub vel: Vec2,
    pub radius: f32,
    pub color: Srgb<u8>,
    pub opacity: f32,
}

impl Particle {
    fn random(rng: &mut Rand, size: Vec2) -> Self {
        // uniform in [0, 1)
        let mut unit = || rng.r#gen::<f32>();
        let pos = pos2(unit() * size.x, unit() * size.y);
        let vel = vec2((unit() - 0.5) * 2.0 * MAX_SPEED, (unit() - 0.5) * 2.0 * MAX_SPEED);
        let radius = MIN_RADIUS + unit() * (MAX_RADIUS - MIN_RADIUS);
        let [cyan, magenta] = neon_colors();
        let color = if unit() > 0.5 { cyan } else { magenta };
        let opacity = MIN_OPACITY + unit() * (MAX_OPACITY - MIN_OPACITY);
        Self {
            pos,
            vel,
            radius,
            color,
            opacity,
        }
    }

    /// Moves one frame and wraps around the edges of `size`.
    fn update(&mut self, size: Vec2) {
        self.pos += self.vel;
        if self.pos.x < 0.0 {
            self.pos.x = size.x;
        }
        if self.pos.x > size.x {
            self.pos.x = 0.0;
        }
        if self.pos.y < 0.0 {
            self.pos.y = size.y;
        }
        if self.pos.y > size.y {
            self.pos.y = 0.0;
        }
    }

    pub fn color32(&self) -> Color32 {
        let rgba = self
            .color
            .into_format::<f32>()
            .with_alpha(self.opacity)
            .into_format::<u8, u8>();
        Color32::from_rgba_unmultiplied(rgba.red, rgba.green, rgba.blue, rgba.alpha)
    }
}

/// Drifting particles painted behind the form.
pub struct Backdrop {
    particles: [Particle; PARTICLE_COUNT],
    size: Vec2,
}

impl Backdrop {
    /// Seeded from the wall clock.
    pub fn new(size: Vec2) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::with_seed(size, seed)
    }

    pub fn with_seed(size: Vec2, seed: u64) -> Self {
        Self::from_rng(size, Rand::with_seed(seed))
    }

    fn from_rng(size: Vec2, mut rng: Rand) -> Self {
        Self {
            particles: std::array::from_fn(|_| Particle::random(&mut rng, size)),
            size,
        }
    }

    /// Returns the backdrop in `slot`, spawning it on first use so the
    /// particles cover the real window rather than egui's startup placeholder.
    pub fn fit(slot: &mut Option<Self>, size: Vec2) -> &mut Self {
        let backdrop = slot.get_or_insert_with(|| {
            log::debug!("backdrop spawned for {size:?}");
            Self::new(size)
        });
        backdrop.resize(size);
        backdrop
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn resize(&mut self, size: Vec2) {
        if size != self.size {
            log::trace!("backdrop resized to {size:?}");
            self.size = size;
        }
    }

    pub fn step(&mut self) {
        if self.size.x <= 0.0 || self.size.y <= 0.0 {
            return;
        }
        for particle in &mut self.particles {
            particle.update(self.size);
        }
    }

    pub fn paint(&self, painter: &egui::Painter) {
        let origin = painter.clip_rect().min.to_vec2();
        for particle in &self.particles {
            painter.circle_filled(particle.pos + origin, particle.radius, particle.color32());
        }
    }
}
