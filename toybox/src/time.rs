use std::{collections::VecDeque, time::Instant};

/// How a `FrameClock` measures the length of a frame
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ClockSource {
    /// Measured from the wall clock
    Realtime,
    /// Every frame lasts exactly this many milliseconds
    Simulated(f64),
}

/// Frame timing shared by the engine loop and apps
#[derive(Debug)]
pub struct FrameClock {
    source: ClockSource,
    /// Length of the last frame in milliseconds
    dt: f64,
    /// Time not yet consumed by fixed steps
    fixed_accumulator: f64,
    elapsed_ms: f64,
    frames: u64,
    window_ms: f64,
    window_frames: u32,
    avg_fps: f64,
    prev_time: Instant,
}

impl FrameClock {
    pub fn new(source: ClockSource) -> FrameClock {
        FrameClock {
            source,
            dt: 0.0,
            fixed_accumulator: 0.0,
            elapsed_ms: 0.0,
            frames: 0,
            window_ms: 0.0,
            window_frames: 0,
            avg_fps: 0.0,
            prev_time: Instant::now(),
        }
    }

    pub fn source(&self) -> ClockSource {
        self.source
    }

    /// Deltatime in milliseconds
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Average fps over the last full second
    pub fn avg_fps(&self) -> f64 {
        self.avg_fps
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Milliseconds the clock has advanced since creation. With a simulated source this is
    /// frames times the step, independent of wall time.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    /// Ends a frame
    pub fn tick(&mut self) {
        let dt = match self.source {
            ClockSource::Realtime => {
                let now = Instant::now();
                let dt = now.duration_since(self.prev_time).as_nanos() as f64 / 1_000_000.0;
                self.prev_time = now;
                dt
            }
            ClockSource::Simulated(step) => step,
        };
        self.dt = dt;
        self.elapsed_ms += dt;
        self.fixed_accumulator += dt;
        self.frames += 1;
        self.window_ms += dt;
        self.window_frames += 1;
        if self.window_ms >= 1000.0 {
            self.avg_fps = self.window_frames as f64 * 1000.0 / self.window_ms;
            self.window_ms = 0.0;
            self.window_frames = 0;
        }
    }

    /// True when at least `step_ms` accumulated since the last fixed step. Leftover time is
    /// dropped, at most one fixed step runs per frame.
    pub fn consume_fixed(&mut self, step_ms: f64) -> bool {
        if self.fixed_accumulator < step_ms {
            return false;
        }
        self.fixed_accumulator = 0.0;
        true
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        FrameClock::new(ClockSource::Realtime)
    }
}

const NUM_TIME_SAMPLES: usize = 150;

/// Rolling average of how long a section of the frame takes
pub struct PerformanceTimer {
    time: Instant,
    data: VecDeque<f64>,
}

impl PerformanceTimer {
    pub fn new() -> Self {
        Self {
            time: Instant::now(),
            data: VecDeque::with_capacity(NUM_TIME_SAMPLES),
        }
    }

    pub fn start(&mut self) {
        self.time = Instant::now()
    }

    pub fn time_it(&mut self) {
        let time = self.time.elapsed().as_nanos() as f64 / 1_000_000.0;
        self.push_dt_ms(time);
    }

    pub fn push_dt_ms(&mut self, dt: f64) {
        if self.data.len() == NUM_TIME_SAMPLES {
            self.data.pop_front();
        }
        self.data.push_back(dt);
    }

    pub fn time_average_ms(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }
}

impl Default for PerformanceTimer {
    fn default() -> Self {
        PerformanceTimer::new()
    }
}
