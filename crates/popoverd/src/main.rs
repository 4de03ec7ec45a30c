use anyhow::{Context, Result};
use popover_core::config::{self, Config};
use popover_core::ipc::{self, ClientMsg, DaemonMsg, LifecycleEvent};
use popover_core::machine::Action;
use popover_core::router::Trigger;
use popover_core::{Mode, Placement, PopupSpec};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

/// Lifecycle messages queued by spec callbacks, flushed after each step.
type Outbox = Rc<RefCell<Vec<DaemonMsg>>>;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("popoverd=info".parse().unwrap()),
        )
        .init();

    // Callbacks are Rc-based, so every session lives on this one thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run())
}

async fn run() -> Result<()> {
    info!("popoverd starting");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "config load failed, using defaults");
            Config::default()
        }
    };
    info!(specs = config.placements.len(), "configuration loaded");
    let config = Rc::new(config);

    let socket_path = config::socket_path();
    // Remove stale socket
    let _ = std::fs::remove_file(&socket_path);
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("binding socket {}", socket_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600)).ok();
    }
    info!(path = %socket_path.display(), "IPC socket listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    tokio::task::spawn_local(handle_client(stream, Rc::clone(&config)));
                }
                Err(e) => warn!(error = %e, "IPC accept error"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    info!("popoverd shutting down");
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

/// One connection drives one trigger instance.
async fn handle_client(stream: UnixStream, defaults: Rc<Config>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let outbox: Outbox = Rc::default();
    let mut session: Option<Trigger> = None;

    info!("client connected");

    // Event-driven timer: sleep only while the instance has something due.
    loop {
        let deadline = session.as_ref().and_then(Trigger::next_deadline);
        let sleep_fut = match deadline {
            Some(dl) => tokio::time::sleep_until(tokio::time::Instant::from_std(dl)),
            None => tokio::time::sleep_until(
                tokio::time::Instant::now() + std::time::Duration::from_secs(86400),
            ),
        };
        let has_deadline = deadline.is_some();

        let replies = tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else {
                    break;
                };
                let Some(msg) = ipc::decode_client(&line) else {
                    debug!(line = %line.trim(), "dropping malformed line");
                    continue;
                };
                handle_msg(&mut session, msg, &defaults, &outbox)
            }
            _ = sleep_fut, if has_deadline => {
                match session.as_mut() {
                    Some(trigger) => apply(trigger.check_timer(Instant::now())),
                    None => Vec::new(),
                }
            }
        };

        let pending: Vec<DaemonMsg> = outbox.borrow_mut().drain(..).collect();
        if send_all(&mut writer, pending.into_iter().chain(replies)).await.is_err() {
            break;
        }
    }

    if let Some(mut trigger) = session.take() {
        trigger.teardown();
    }
    info!("client disconnected");
}

async fn send_all<W>(writer: &mut W, msgs: impl Iterator<Item = DaemonMsg>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for msg in msgs {
        writer.write_all(ipc::encode(&msg).as_bytes()).await?;
    }
    Ok(())
}

fn handle_msg(
    session: &mut Option<Trigger>,
    msg: ClientMsg,
    defaults: &Config,
    outbox: &Outbox,
) -> Vec<DaemonMsg> {
    match msg {
        ClientMsg::Mount {
            id,
            trigger,
            viewport,
            config,
        } => {
            let mut replies = unmount(session);
            let mut config = match config {
                Some(source) => match Config::parse(&source) {
                    Ok(config) => config,
                    Err(e) => {
                        let message = format!("{:#}", e);
                        warn!(id = %id, error = %message, "rejecting mount");
                        replies.push(DaemonMsg::Ack { ok: false, message });
                        return replies;
                    }
                },
                None => defaults.clone(),
            };
            for (placement, mode, spec) in config.placements.specs_mut() {
                forward_lifecycle(spec, placement, mode, outbox);
            }

            info!(id = %id, specs = config.placements.len(), "trigger mounted");
            let message = format!("mounted {}", id);
            *session = Some(Trigger::new(id, config, trigger, viewport));
            replies.push(DaemonMsg::Ack { ok: true, message });
            replies
        }
        ClientMsg::Input { event } => match session.as_mut() {
            Some(trigger) => apply(trigger.handle(event, Instant::now())),
            None => vec![DaemonMsg::Ack {
                ok: false,
                message: "no trigger mounted".into(),
            }],
        },
        ClientMsg::Unmount => {
            let mut replies = unmount(session);
            replies.push(DaemonMsg::Ack {
                ok: true,
                message: "unmounted".into(),
            });
            replies
        }
    }
}

fn unmount(session: &mut Option<Trigger>) -> Vec<DaemonMsg> {
    match session.take() {
        Some(mut trigger) => {
            info!(id = %trigger.machine().id(), "trigger unmounted");
            apply(trigger.teardown())
        }
        None => Vec::new(),
    }
}

fn apply(actions: Vec<Action>) -> Vec<DaemonMsg> {
    actions
        .into_iter()
        .map(|action| DaemonMsg::Apply { action })
        .collect()
}

/// Replace a spec's hooks with ones that report back to the host.
fn forward_lifecycle(spec: &mut PopupSpec, placement: Placement, mode: Mode, outbox: &Outbox) {
    let hook = |event: LifecycleEvent| -> Option<popover_core::popup::Callback> {
        let outbox = Rc::clone(outbox);
        Some(Rc::new(move || {
            outbox.borrow_mut().push(DaemonMsg::Lifecycle {
                event,
                placement,
                mode,
            });
        }))
    };
    spec.on_open = hook(LifecycleEvent::Open);
    spec.on_close = hook(LifecycleEvent::Close);
    spec.on_mouse_enter = hook(LifecycleEvent::MouseEnter);
    spec.on_mouse_leave = hook(LifecycleEvent::MouseLeave);
}

#[cfg(test)]
mod tests {
    use super::*;
    use popover_core::router::InputEvent;
    use popover_core::{Rect, Size};

    fn mount(config: Option<&str>) -> ClientMsg {
        ClientMsg::Mount {
            id: "tip".into(),
            trigger: Rect::new(300.0, 400.0, 80.0, 30.0),
            viewport: Size::new(1024.0, 768.0),
            config: config.map(str::to_string),
        }
    }

    const CLICK_RIGHT: &str = r#"
[placements.right.click]
element = "Menu"
"#;

    #[test]
    fn input_before_mount_is_refused() {
        let mut session = None;
        let replies = handle_msg(
            &mut session,
            ClientMsg::Input {
                event: InputEvent::Click,
            },
            &Config::default(),
            &Outbox::default(),
        );
        assert!(matches!(replies.as_slice(), [DaemonMsg::Ack { ok: false, .. }]));
    }

    #[test]
    fn bad_config_is_refused() {
        let mut session = None;
        let replies = handle_msg(
            &mut session,
            mount(Some("[placements.middle.hover]\nelement = \"x\"\n")),
            &Config::default(),
            &Outbox::default(),
        );
        assert!(matches!(replies.as_slice(), [DaemonMsg::Ack { ok: false, .. }]));
        assert!(session.is_none());
    }

    #[test]
    fn lifecycle_hooks_reach_the_outbox() {
        let outbox = Outbox::default();
        let mut session = None;
        let defaults = Config::default();
        handle_msg(&mut session, mount(Some(CLICK_RIGHT)), &defaults, &outbox);
        handle_msg(
            &mut session,
            ClientMsg::Input {
                event: InputEvent::Click,
            },
            &defaults,
            &outbox,
        );

        let fired = session.as_mut().unwrap().check_timer(Instant::now());
        assert!(fired.iter().any(|a| matches!(a, Action::Show(_))));
        assert_eq!(
            *outbox.borrow(),
            vec![DaemonMsg::Lifecycle {
                event: LifecycleEvent::Open,
                placement: Placement::Right,
                mode: Mode::Click,
            }]
        );
    }

    #[test]
    fn unmount_detaches_open_overlay() {
        let outbox = Outbox::default();
        let mut session = None;
        let defaults = Config::default();
        handle_msg(&mut session, mount(Some(CLICK_RIGHT)), &defaults, &outbox);
        handle_msg(
            &mut session,
            ClientMsg::Input {
                event: InputEvent::Click,
            },
            &defaults,
            &outbox,
        );
        session.as_mut().unwrap().check_timer(Instant::now());
        outbox.borrow_mut().clear();

        let replies = handle_msg(&mut session, ClientMsg::Unmount, &defaults, &outbox);
        assert!(matches!(
            replies.as_slice(),
            [
                DaemonMsg::Apply {
                    action: Action::Unlisten { .. }
                },
                DaemonMsg::Ack { ok: true, .. }
            ]
        ));
        assert!(session.is_none());
        assert!(outbox.borrow().is_empty(), "teardown runs no hooks");
    }
}
