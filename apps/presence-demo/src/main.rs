use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use compose_core::collections::map::HashMap;
use compose_presence::{
    NodeLayout, PresenceChild, PresenceCoordinator, PresenceKey, PresenceMode, PresenceNode,
    PresenceParticipant, PresenceSpec,
};
use compose_runtime_std::StdRuntime;

const FADE_TICKS: u32 = 3;
const TOTAL_TICKS: u32 = 14;
const TICK: Duration = Duration::from_millis(120);

#[derive(Debug, Clone, PartialEq)]
struct Notification {
    id: i64,
    text: &'static str,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.text)
    }
}

enum Event {
    Post(Notification),
    Dismiss(i64),
    Clear,
}

/// What happens at each tick of the demo.
fn script(tick: u32) -> Vec<Event> {
    let post = |id, text| Event::Post(Notification { id, text });
    match tick {
        0 => vec![
            post(1, "Build finished"),
            post(2, "New message from Ada"),
            post(3, "Disk almost full"),
        ],
        2 => vec![Event::Dismiss(2)],
        3 => vec![post(4, "Update available")],
        4 => vec![Event::Dismiss(1), Event::Dismiss(3)],
        5 => vec![post(3, "Disk almost full")],
        9 => vec![Event::Clear],
        _ => Vec::new(),
    }
}

/// Exit animation of one notification, counted in ticks.
struct FadeOut {
    participant: PresenceParticipant,
    ticks_left: u32,
}

struct NotificationList {
    host: StdRuntime,
    coordinator: PresenceCoordinator<Notification>,
    spec: PresenceSpec,
    requested: Vec<Notification>,
    nodes: Vec<PresenceNode<Notification>>,
    fades: HashMap<PresenceKey, FadeOut>,
    dirty: bool,
}

impl NotificationList {
    fn new(host: StdRuntime, mode: PresenceMode) -> Self {
        let coordinator = PresenceCoordinator::new(host.runtime_handle());
        let spec = PresenceSpec::new(mode)
            .initial(false)
            .on_exit_complete(|| log::info!("every dismissed notification is gone"));
        Self {
            host,
            coordinator,
            spec,
            requested: Vec::new(),
            nodes: Vec::new(),
            fades: HashMap::default(),
            dirty: false,
        }
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::Post(notification) => {
                log::info!("post {notification}");
                self.requested.retain(|existing| existing.id != notification.id);
                self.requested.push(notification);
            }
            Event::Dismiss(id) => {
                log::info!("dismiss #{id}");
                self.requested.retain(|existing| existing.id != id);
            }
            Event::Clear => {
                log::info!("clear all");
                self.requested.clear();
            }
        }
        self.dirty = true;
    }

    fn render(&mut self) {
        let children = self.requested.iter().map(|notification| {
            PresenceChild::from_rc(notification.id, Rc::new(notification.clone()))
        });
        self.nodes = self.coordinator.evaluate(children, &self.spec);
        self.dirty = false;

        for node in &self.nodes {
            if node.is_present() && !self.fades.contains_key(node.key()) {
                self.fades.insert(
                    node.key().clone(),
                    FadeOut {
                        participant: node.context().use_presence(),
                        ticks_left: FADE_TICKS,
                    },
                );
            }
        }
        let live: Vec<&PresenceKey> = self.nodes.iter().map(|node| node.key()).collect();
        self.fades.retain(|key, _| live.contains(&key));
    }

    /// Advances every running fade by one tick.
    fn animate(&mut self) {
        let mut finished = Vec::new();
        for (key, fade) in self.fades.iter_mut() {
            if fade.participant.is_present() {
                fade.ticks_left = FADE_TICKS;
                continue;
            }
            fade.ticks_left = fade.ticks_left.saturating_sub(1);
            if fade.ticks_left == 0 {
                finished.push(key.clone());
            }
        }
        for key in finished {
            if let Some(fade) = self.fades.remove(&key) {
                log::debug!("fade of {key} finished");
                fade.participant.safe_to_remove();
            }
        }
    }

    fn frame(&mut self) {
        if self.dirty || self.host.take_frame_request() {
            self.render();
        }
        self.animate();
        self.host.drain_tasks();
    }

    fn print(&self, tick: u32) {
        let rows: Vec<String> = self
            .nodes
            .iter()
            .map(|node| {
                let marker = match (node.is_present(), node.layout()) {
                    (true, _) => " ",
                    (false, NodeLayout::InPlace) => "~",
                    (false, NodeLayout::PopLayout) => "^",
                };
                format!("{marker}{}", node.content())
            })
            .collect();
        println!("[{tick:>2}] {}", rows.join(" | "));
    }
}

fn parse_mode() -> PresenceMode {
    match std::env::args().nth(1).as_deref() {
        Some("--wait") => PresenceMode::Wait,
        Some("--pop-layout") => PresenceMode::PopLayout,
        Some(other) => {
            log::warn!("unknown option {other}, using sync mode");
            PresenceMode::Sync
        }
        None => PresenceMode::Sync,
    }
}

fn main() {
    env_logger::init();

    let mode = parse_mode();
    println!("=== Compose-RS Presence Example ({mode:?}) ===");
    println!("Dismissed notifications stay on screen, marked '~', while they fade out.");
    println!();

    let host = StdRuntime::new();
    host.set_frame_waker(|| log::trace!("frame requested"));
    let mut list = NotificationList::new(host.clone(), mode);

    for tick in 0..TOTAL_TICKS {
        for event in script(tick) {
            list.apply(event);
        }
        list.frame();
        list.print(tick);
        std::thread::sleep(TICK);
    }

    host.clear_frame_waker();
    log::debug!("final coordinator state: {:?}", list.coordinator);
}
