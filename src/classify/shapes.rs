use crate::classify::frame::{frame_body, FrameDescriptor};
use crate::classify::{EventKind, FrameCounters, FrameEvent, RequestLine, StreamState};
use regex::{Captures, Regex};

/// Optional `AH01234: ` message code httpd puts in front of many messages.
const AH: &str = r"^(?:AH\d+: )?";

type Build = fn(&Captures<'_>, &str) -> Option<EventKind>;

/// A named message shape: a pattern plus the function that turns its captures
/// into an [`EventKind`].
pub struct Shape {
    name: &'static str,
    regex: Regex,
    build: Build,
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shape")
            .field("name", &self.name)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

impl Shape {
    fn new(name: &'static str, pattern: &str, build: Build) -> Self {
        let regex = Regex::new(&format!("{AH}{pattern}"))
            .unwrap_or_else(|e| panic!("built-in shape '{}' must compile: {}", name, e));
        Self { name, regex, build }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Try this shape against a message. A match with malformed numbers yields None.
    pub fn matches(&self, message: &str) -> Option<EventKind> {
        let caps = self.regex.captures(message)?;
        (self.build)(&caps, message)
    }
}

/// The shapes mod_http2 writes for stream lifecycle and frame traffic.
pub fn builtin_shapes() -> Vec<Shape> {
    vec![
        Shape::new(
            "created",
            r"h2_stream\((?P<session>\d+)-(?P<stream>\d+)(?:,IDLE)?\): created",
            stream_created,
        ),
        Shape::new(
            "entered state",
            concat!(
                r"h2_stream\((?P<session>\d+)-(?P<stream>\d+),(?P<from>[A-Z_]+)\): ",
                r"(?:entered state|transit to \[(?P<to>[A-Z_]+)\])",
            ),
            stream_state_entered,
        ),
        Shape::new(
            "schedule",
            concat!(
                r"h2_stream\((?P<session>\d+)-(?P<stream>\d+),[A-Z_]+\): ",
                r"schedule (?P<method>\S+) (?P<url>.*?) chunked=(?P<chunked>\d+)",
            ),
            stream_scheduled,
        ),
        Shape::new(
            "RST_STREAM",
            r"h2_stream\((?P<session>\d+)-(?P<stream>\d+)(?:,[A-Z_]+)?\): RST_STREAM(?: (?P<code>\d+))?",
            stream_reset,
        ),
        Shape::new(
            "cleanup",
            r"h2_stream\((?P<session>\d+)-(?P<stream>\d+),CLEANUP\): cleanup",
            stream_cleanup,
        ),
        Shape::new(
            "destroy",
            r"h2_stream\((?P<session>\d+)-(?P<stream>\d+),CLEANUP\): destroy",
            stream_destroyed,
        ),
        Shape::new(
            "process connection",
            r"h2_task\((?P<session>\d+)-(?P<stream>\d+)\): process connection",
            task_process_start,
        ),
        Shape::new(
            "request done",
            concat!(
                r"h2_mplx\((?P<session>\d+)(?:-(?P<stream>\d+))?\): ",
                r"request done, (?P<elapsed>\d+(?:\.\d+)?) ms elapsed",
            ),
            request_done,
        ),
        Shape::new(
            "FRAME",
            concat!(
                r"h2_session\((?P<session>\d+)(?:,(?P<state>[A-Z_]+))?(?:,(?P<open>\d+))?\): ",
                r"(?P<dir>recv|sent) FRAME\[",
            ),
            frame,
        ),
    ]
}

fn num<T: std::str::FromStr>(caps: &Captures<'_>, name: &str) -> Option<T> {
    caps.name(name)?.as_str().parse().ok()
}

/// Parse an optional numeric group: absent is fine, present-but-malformed is not.
fn opt_num<T: std::str::FromStr>(caps: &Captures<'_>, name: &str) -> Option<Option<T>> {
    match caps.name(name) {
        Some(m) => m.as_str().parse().ok().map(Some),
        None => Some(None),
    }
}

fn ids(caps: &Captures<'_>) -> Option<(u64, u32)> {
    Some((num(caps, "session")?, num(caps, "stream")?))
}

fn stream_created(caps: &Captures<'_>, _: &str) -> Option<EventKind> {
    let (session, stream) = ids(caps)?;
    Some(EventKind::StreamCreated { session, stream })
}

fn stream_state_entered(caps: &Captures<'_>, _: &str) -> Option<EventKind> {
    let (session, stream) = ids(caps)?;
    let label = caps.name("to").or_else(|| caps.name("from"))?.as_str();
    let state = StreamState::from_label(label)?;
    Some(EventKind::StreamStateEntered {
        session,
        stream,
        state,
    })
}

fn stream_scheduled(caps: &Captures<'_>, _: &str) -> Option<EventKind> {
    let (session, stream) = ids(caps)?;
    let chunked: u8 = num(caps, "chunked")?;
    Some(EventKind::StreamScheduled {
        session,
        stream,
        request: RequestLine {
            method: caps["method"].to_string(),
            url: caps["url"].to_string(),
            chunked: chunked != 0,
        },
    })
}

fn stream_reset(caps: &Captures<'_>, _: &str) -> Option<EventKind> {
    let (session, stream) = ids(caps)?;
    Some(EventKind::StreamReset {
        session,
        stream,
        error_code: opt_num(caps, "code")?,
    })
}

fn stream_cleanup(caps: &Captures<'_>, _: &str) -> Option<EventKind> {
    let (session, stream) = ids(caps)?;
    Some(EventKind::StreamCleanup { session, stream })
}

fn stream_destroyed(caps: &Captures<'_>, _: &str) -> Option<EventKind> {
    let (session, stream) = ids(caps)?;
    Some(EventKind::StreamDestroyed { session, stream })
}

fn task_process_start(caps: &Captures<'_>, _: &str) -> Option<EventKind> {
    let (session, stream) = ids(caps)?;
    Some(EventKind::TaskProcessStart { session, stream })
}

fn request_done(caps: &Captures<'_>, _: &str) -> Option<EventKind> {
    Some(EventKind::RequestDone {
        session: num(caps, "session")?,
        stream: opt_num(caps, "stream")?,
        elapsed_ms: num(caps, "elapsed")?,
    })
}

fn frame(caps: &Captures<'_>, message: &str) -> Option<EventKind> {
    let descriptor = FrameDescriptor::parse(frame_body(message)?)?;
    let counters = match message.rsplit_once("frames=") {
        Some((_, tail)) => Some(parse_counters(tail)?),
        None => None,
    };

    let event = FrameEvent {
        session: num(caps, "session")?,
        session_state: caps.name("state").map(|m| m.as_str().to_string()),
        open_streams: opt_num(caps, "open")?,
        frame: descriptor,
        counters,
    };

    Some(match &caps["dir"] {
        "recv" => EventKind::FrameRecv(event),
        _ => EventKind::FrameSent(event),
    })
}

/// Parse `<received>/<sent> (r/s)`.
fn parse_counters(tail: &str) -> Option<FrameCounters> {
    let token = tail.split_whitespace().next()?;
    let (received, sent) = token.split_once('/')?;
    Some(FrameCounters {
        received: received.parse().ok()?,
        sent: sent.parse().ok()?,
    })
}
