//! Mood-driven desktop behavior. Given the current mood and the window
//! registry, decide which UI moves to make this tick. Randomness comes in
//! from the caller so the same seed always yields the same plan.

use rand::seq::SliceRandom;
use rand::Rng;
use std::time::{Duration, Instant};

use crate::api::BehaviorHints;
use crate::catalog::WindowId;
use crate::wm::WindowManager;

const NUDGE_MAX: i32 = 40;
const RESIZE_MAX: i32 = 40;
const OPEN_CHANCE: f64 = 0.3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Mood {
    Happy,
    Excited,
    #[default]
    Calm,
    Sleepy,
    Thinking,
    Loving,
    Playful,
    Cozy,
    Angry,
    Offended,
    Other(String),
}

impl Mood {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "happy" => Mood::Happy,
            "excited" => Mood::Excited,
            "calm" => Mood::Calm,
            "sleepy" => Mood::Sleepy,
            "thinking" => Mood::Thinking,
            "loving" => Mood::Loving,
            "playful" => Mood::Playful,
            "cozy" => Mood::Cozy,
            "angry" => Mood::Angry,
            "offended" => Mood::Offended,
            _ => Mood::Other(label.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Mood::Happy => "happy",
            Mood::Excited => "excited",
            Mood::Calm => "calm",
            Mood::Sleepy => "sleepy",
            Mood::Thinking => "thinking",
            Mood::Loving => "loving",
            Mood::Playful => "playful",
            Mood::Cozy => "cozy",
            Mood::Angry => "angry",
            Mood::Offended => "offended",
            Mood::Other(label) => label,
        }
    }

    fn is_mischievous(&self) -> bool {
        matches!(self, Mood::Angry | Mood::Offended | Mood::Playful)
    }
}

/// Icon mischief runs for the three restless moods unless the server
/// explicitly turned it off.
pub fn wants_mischief(mood: &Mood, hints: &BehaviorHints) -> bool {
    mood.is_mischievous() && hints.desktop_mischief != Some(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Shake(WindowId),
    Nudge { window: WindowId, dx: i32, dy: i32 },
    Focus(WindowId),
    Open(WindowId),
    Resize { window: WindowId, dw: i32, dh: i32 },
    Minimize(WindowId),
}

fn visible(wm: &WindowManager) -> Vec<WindowId> {
    wm.windows()
        .filter(|w| !w.minimized)
        .map(|w| w.id.clone())
        .collect()
}

fn nonzero_delta<R: Rng + ?Sized>(rng: &mut R, max: i32) -> i32 {
    let magnitude = rng.gen_range(max / 4..=max);
    if rng.gen_bool(0.5) {
        magnitude
    } else {
        -magnitude
    }
}

/// Plan this tick's moves. Geometry steps (nudge, resize) are left out in
/// mobile mode.
pub fn choreograph<R: Rng + ?Sized>(
    mood: &Mood,
    wm: &WindowManager,
    now: Instant,
    stale_after: Duration,
    rng: &mut R,
) -> Vec<Step> {
    let geometry = !wm.is_mobile();
    let mut steps = Vec::new();
    match mood {
        Mood::Angry | Mood::Offended => {
            let targets: Vec<WindowId> = visible(wm)
                .into_iter()
                .filter(|id| !id.is("settings"))
                .collect();
            if let Some(target) = targets.choose(rng) {
                steps.push(Step::Shake(target.clone()));
            }
        }
        Mood::Playful => {
            if geometry {
                if let Some(target) = visible(wm).choose(rng) {
                    steps.push(Step::Nudge {
                        window: target.clone(),
                        dx: nonzero_delta(rng, NUDGE_MAX),
                        dy: nonzero_delta(rng, NUDGE_MAX),
                    });
                }
            }
            let games = WindowId::new("games");
            if !wm.is_open_and_visible(&games) && rng.gen_bool(OPEN_CHANCE) {
                steps.push(Step::Open(games));
            }
        }
        Mood::Happy | Mood::Excited => {
            let focused = wm.focused_id().cloned();
            let others: Vec<WindowId> = visible(wm)
                .into_iter()
                .filter(|id| Some(id) != focused.as_ref())
                .collect();
            if let Some(target) = others.choose(rng) {
                steps.push(Step::Focus(target.clone()));
            }
            let player = WindowId::new("player");
            if !wm.is_open_and_visible(&player) && rng.gen_bool(OPEN_CHANCE) {
                steps.push(Step::Open(player));
            }
        }
        Mood::Thinking => {
            let browser = WindowId::new("browser");
            if !wm.is_open_and_visible(&browser) && rng.gen_bool(OPEN_CHANCE) {
                steps.push(Step::Open(browser));
            } else if geometry && rng.gen_bool(OPEN_CHANCE) {
                if let Some(target) = visible(wm).choose(rng) {
                    steps.push(Step::Resize {
                        window: target.clone(),
                        dw: nonzero_delta(rng, RESIZE_MAX),
                        dh: nonzero_delta(rng, RESIZE_MAX),
                    });
                }
            }
        }
        Mood::Sleepy | Mood::Calm | Mood::Cozy | Mood::Loving => {
            steps.extend(
                wm.stale_windows(now, stale_after)
                    .into_iter()
                    .map(Step::Minimize),
            );
        }
        Mood::Other(_) => {}
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin_spec;
    use crate::geometry::Viewport;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn wm_with(ids: &[&str], now: Instant) -> WindowManager {
        let mut wm = WindowManager::new(Viewport::new(1280, 800), 768);
        for id in ids {
            let id = WindowId::new(*id);
            let spec = builtin_spec(&id).unwrap();
            wm.open(id, &spec, now);
        }
        wm
    }

    const STALE: Duration = Duration::from_secs(20 * 60);

    #[test]
    fn angry_shakes_exactly_one_window_never_settings() {
        let now = Instant::now();
        let wm = wm_with(&["chat", "settings", "player"], now);
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            for mood in [Mood::Angry, Mood::Offended] {
                let steps = choreograph(&mood, &wm, now, STALE, &mut rng);
                assert_eq!(steps.len(), 1);
                match &steps[0] {
                    Step::Shake(id) => assert!(!id.is("settings")),
                    other => panic!("unexpected {other:?}"),
                }
            }
        }
    }

    #[test]
    fn angry_with_only_settings_open_does_nothing() {
        let now = Instant::now();
        let wm = wm_with(&["settings"], now);
        let mut rng = StdRng::seed_from_u64(7);
        assert!(choreograph(&Mood::Angry, &wm, now, STALE, &mut rng).is_empty());
    }

    #[test]
    fn calm_minimizes_only_stale_unfocused_windows() {
        let start = Instant::now();
        let mut wm = wm_with(&["chat", "files"], start);
        let later = start + Duration::from_secs(25 * 60);
        wm.open(WindowId::new("browser"), &builtin_spec(&WindowId::new("browser")).unwrap(), later);
        let mut rng = StdRng::seed_from_u64(1);
        let steps = choreograph(&Mood::Calm, &wm, later, STALE, &mut rng);
        let mut minimized: Vec<_> = steps
            .into_iter()
            .map(|s| match s {
                Step::Minimize(id) => id.to_string(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        minimized.sort();
        assert_eq!(minimized, vec!["chat".to_string(), "files".to_string()]);
    }

    #[test]
    fn mobile_mode_skips_geometry() {
        let now = Instant::now();
        let mut wm = wm_with(&["chat", "files"], now);
        wm.set_force_mobile(true);
        for seed in 0..30 {
            let mut rng = StdRng::seed_from_u64(seed);
            for mood in [Mood::Playful, Mood::Thinking] {
                for step in choreograph(&mood, &wm, now, STALE, &mut rng) {
                    assert!(matches!(step, Step::Open(_)), "{step:?}");
                }
            }
        }
    }

    #[test]
    fn happy_refocuses_a_background_window() {
        let now = Instant::now();
        let wm = wm_with(&["chat", "files"], now);
        let mut rng = StdRng::seed_from_u64(3);
        let steps = choreograph(&Mood::Happy, &wm, now, STALE, &mut rng);
        assert_eq!(steps.first(), Some(&Step::Focus(WindowId::new("chat"))));
    }

    #[test]
    fn mischief_respects_the_server_switch() {
        let off = BehaviorHints {
            desktop_mischief: Some(false),
            ..BehaviorHints::default()
        };
        assert!(wants_mischief(&Mood::Playful, &BehaviorHints::default()));
        assert!(!wants_mischief(&Mood::Angry, &off));
        assert!(!wants_mischief(&Mood::Calm, &BehaviorHints::default()));
        assert_eq!(Mood::parse("Sleepy"), Mood::Sleepy);
        assert_eq!(Mood::parse("dreamy").label(), "dreamy");
    }
}
