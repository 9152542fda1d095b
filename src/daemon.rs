//! The control loop.
//!
//! Single-threaded and cooperative: the loop sleeps between idle samples,
//! blocks on the display connection while the overlay is coming up, and
//! redraws once a second while resting. Display events are dispatched in one
//! place, [`dispatch`].

use std::future::Future;

use tokio::time::Instant;
use tracing::{debug, error, info, trace};

use crate::display::{DisplayError, DisplayEvent, DisplayServerAdapter};
use crate::machine::{BreakStateMachine, Phase, Transition, Wait};
use crate::notify::{Notification, Notifier};
use crate::render::Renderer;

/// Run the break enforcer until `shutdown` resolves or the display fails.
///
/// Any live overlay is torn down before returning, whether the loop ends
/// normally or with an error.
pub async fn run<D, R, S>(
    machine: &mut BreakStateMachine,
    display: &mut D,
    renderer: &mut R,
    notifier: &Notifier,
    shutdown: S,
) -> Result<(), DisplayError>
where
    D: DisplayServerAdapter,
    R: Renderer,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    info!(
        "Checking activity every {}s, break after {}s of work, {}s rest",
        machine.schedule().check_period_seconds(),
        machine.schedule().work_threshold_seconds(),
        machine.schedule().rest_duration_seconds()
    );

    loop {
        let step = match machine.next_wait() {
            Wait::Sleep(period) => {
                tokio::select! {
                    () = &mut shutdown => {
                        info!("Shutting down");
                        break;
                    }
                    () = tokio::time::sleep(period) => {}
                }
                step_after_sleep(machine, display, renderer)
            }
            // Blocks the thread with no timeout. If the server never sends
            // the paint notification, the loop stalls here. The shutdown
            // future is not polled meanwhile, and tokio already owns SIGINT
            // and SIGTERM, so only SIGKILL ends a stalled process.
            Wait::FirstPaint(window) => display
                .wait_for_paint_notification(window)
                .and_then(|()| {
                    let event = DisplayEvent::PaintNeeded { window };
                    dispatch(event, Instant::now(), machine, display, renderer)
                }),
        };

        match step {
            Ok(transition) => announce(notifier, transition).await,
            Err(e) => {
                error!("Display failure: {}", e);
                machine.abandon(display);
                return Err(e);
            }
        }
    }

    machine.abandon(display);
    Ok(())
}

/// One step after a timed wait: drain pending events while resting, then
/// tick.
fn step_after_sleep<D, R>(
    machine: &mut BreakStateMachine,
    display: &mut D,
    renderer: &mut R,
) -> Result<Transition, DisplayError>
where
    D: DisplayServerAdapter,
    R: Renderer,
{
    if machine.phase() == Phase::Resting {
        while let Some(event) = display.poll_event()? {
            let transition = dispatch(event, Instant::now(), machine, display, renderer)?;
            if transition != Transition::None {
                return Ok(transition);
            }
        }
    }
    machine.tick(Instant::now(), display, renderer)
}

/// Route one display event to the state machine.
pub fn dispatch<D, R>(
    event: DisplayEvent,
    now: Instant,
    machine: &mut BreakStateMachine,
    display: &mut D,
    renderer: &mut R,
) -> Result<Transition, DisplayError>
where
    D: DisplayServerAdapter + ?Sized,
    R: Renderer + ?Sized,
{
    match event {
        DisplayEvent::PaintNeeded { window } => {
            trace!("Paint needed for {:?}", window);
            machine.on_paint_needed(window, now, display, renderer)
        }
        // Input during a rest is swallowed by the grab; there is no way to
        // skip a break.
        DisplayEvent::PointerMoved { window } | DisplayEvent::KeyPressed { window } => {
            trace!("Ignoring input on {:?}", window);
            Ok(Transition::None)
        }
        DisplayEvent::Other => Ok(Transition::None),
    }
}

async fn announce(notifier: &Notifier, transition: Transition) {
    match transition {
        Transition::RestDue { worked_seconds } => {
            notifier.send(&Notification::rest_due(worked_seconds)).await;
        }
        Transition::RestFinished => notifier.send(&Notification::rest_over()).await,
        Transition::RestStarted | Transition::RestAborted => {
            debug!("Transition: {:?}", transition);
        }
        Transition::None => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::display::WindowHandle;
    use crate::display::fake::{Call, FakeDisplay};
    use crate::machine::Schedule;

    fn machine(check: u64, threshold: u64, rest: u64) -> BreakStateMachine {
        BreakStateMachine::new(Schedule::new(check, threshold, rest).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cycle_in_order() {
        let mut machine = machine(10, 20, 5);
        let mut display = FakeDisplay::new();
        let mut renderer = display.renderer();

        // Two active checks (t=10, t=20) reach the threshold, the overlay
        // comes up, five seconds of rest end at t=25. Stop well before the
        // next threshold at t=45.
        run(
            &mut machine,
            &mut display,
            &mut renderer,
            &Notifier::disabled(),
            tokio::time::sleep(Duration::from_secs(40)),
        )
        .await
        .unwrap();

        assert_eq!(machine.rests_started(), 1);
        assert_eq!(machine.phase(), Phase::Working);
        assert_eq!(machine.session().accumulated_work_seconds(), 10);

        let w = WindowHandle(1);
        let grab = display.position(|c| *c == Call::Grab(w)).unwrap();
        let first_text = display.position(|c| matches!(c, Call::Text(..))).unwrap();
        let release = display.position(|c| *c == Call::Release).unwrap();
        let last_text = display
            .calls()
            .iter()
            .rposition(|c| matches!(c, Call::Text(..)))
            .unwrap();
        assert!(display.position(|c| *c == Call::RequestVisible(w)).unwrap() < grab);
        assert!(grab < first_text);
        assert!(last_text < release);
        assert_eq!(
            display.texts(),
            vec!["00:05", "00:04", "00:03", "00:02", "00:01", "00:00"]
        );
        assert_eq!(display.count(|c| *c == Call::Destroy(w)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_user_never_gets_overlay() {
        let mut machine = machine(10, 20, 5);
        let mut display = FakeDisplay::new();
        display.default_idle = 600;
        let mut renderer = display.renderer();

        run(
            &mut machine,
            &mut display,
            &mut renderer,
            &Notifier::disabled(),
            tokio::time::sleep(Duration::from_secs(1000)),
        )
        .await
        .unwrap();

        assert_eq!(machine.rests_started(), 0);
        assert_eq!(display.windows_created, 0);
        assert_eq!(machine.session().accumulated_work_seconds(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_mid_rest_releases_grab() {
        let mut machine = machine(10, 10, 300);
        let mut display = FakeDisplay::new();
        let mut renderer = display.renderer();

        run(
            &mut machine,
            &mut display,
            &mut renderer,
            &Notifier::disabled(),
            tokio::time::sleep(Duration::from_secs(60)),
        )
        .await
        .unwrap();

        assert_eq!(machine.phase(), Phase::Working);
        assert!(machine.overlay().is_none());
        assert_eq!(display.count(|c| *c == Call::Release), 1);
        assert_eq!(display.count(|c| matches!(c, Call::Destroy(_))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_ends_loop() {
        let mut machine = machine(10, 10, 300);
        let mut display = FakeDisplay::new();
        display.fail_probe = true;
        let mut renderer = display.renderer();

        let result = run(
            &mut machine,
            &mut display,
            &mut renderer,
            &Notifier::disabled(),
            std::future::pending(),
        )
        .await;

        assert!(matches!(result, Err(DisplayError::ProbeUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repaint_events_while_resting() {
        let mut machine = machine(10, 10, 300);
        let mut display = FakeDisplay::new();
        let mut renderer = display.renderer();

        // Get the overlay up by hand, then queue an extra expose
        machine
            .tick(Instant::now(), &mut display, &mut renderer)
            .unwrap();
        let event = display.next_event().unwrap();
        dispatch(event, Instant::now(), &mut machine, &mut display, &mut renderer).unwrap();
        assert_eq!(machine.phase(), Phase::Resting);
        display.push_event(DisplayEvent::PaintNeeded {
            window: WindowHandle(1),
        });
        display.push_event(DisplayEvent::PointerMoved {
            window: WindowHandle(1),
        });

        run(
            &mut machine,
            &mut display,
            &mut renderer,
            &Notifier::disabled(),
            tokio::time::sleep(Duration::from_millis(1500)),
        )
        .await
        .unwrap();

        // Initial frame, repaint from the queued expose, one tick frame
        assert_eq!(display.texts(), vec!["05:00", "04:59", "04:59"]);
        assert!(display.events.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_failure_after_grab_releases_input() {
        let mut machine = machine(10, 10, 300);
        let mut display = FakeDisplay::new();
        let mut renderer = display.renderer();
        renderer.fail_draw = true;

        let result = run(
            &mut machine,
            &mut display,
            &mut renderer,
            &Notifier::disabled(),
            std::future::pending(),
        )
        .await;

        assert!(matches!(result, Err(DisplayError::RequestFailed(_))));
        assert_eq!(machine.phase(), Phase::Working);
        assert!(machine.overlay().is_none());

        let w = WindowHandle(1);
        assert_eq!(
            display.calls(),
            vec![
                Call::Create(w),
                Call::HideCursor(w),
                Call::RequestVisible(w),
                Call::Grab(w),
                Call::Release,
                Call::Hide(w),
                Call::Destroy(w),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_error_while_awaiting_paint_ends_loop() {
        let mut machine = machine(10, 10, 300);
        let mut display = FakeDisplay::new();
        display.withhold_paint = true;
        display.fail_events = true;
        let mut renderer = display.renderer();

        let result = run(
            &mut machine,
            &mut display,
            &mut renderer,
            &Notifier::disabled(),
            std::future::pending(),
        )
        .await;

        assert!(matches!(result, Err(DisplayError::RequestFailed(_))));
        assert_eq!(machine.phase(), Phase::Working);
        assert_eq!(display.count(|c| matches!(c, Call::Grab(_))), 0);
        assert_eq!(display.count(|c| *c == Call::Destroy(WindowHandle(1))), 1);
    }

    #[test]
    fn test_dispatch_ignores_input_events() {
        let mut machine = machine(10, 10, 300);
        let mut display = FakeDisplay::new();
        let mut renderer = display.renderer();
        let now = Instant::now();

        for event in [
            DisplayEvent::PointerMoved {
                window: WindowHandle(1),
            },
            DisplayEvent::KeyPressed {
                window: WindowHandle(1),
            },
            DisplayEvent::Other,
        ] {
            let t = dispatch(event, now, &mut machine, &mut display, &mut renderer).unwrap();
            assert_eq!(t, Transition::None);
        }
        assert!(display.calls().is_empty());
    }
}
