use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::geometry::{DisplayRect, Point, SurfaceSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Pointer,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Begin,
    Drag,
    End,
}

const INPUTS: [InputKind; 2] = [InputKind::Pointer, InputKind::Touch];
const PHASES: [Phase; 3] = [Phase::Begin, Phase::Drag, Phase::End];

/// One raw interaction event, already translated to surface coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub input: InputKind,
    pub phase: Phase,
    pub point: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// The set of gesture listeners attached to the interaction surface.
/// Events with no matching listener are dropped before they reach a selector.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next: u64,
    active: BTreeMap<ListenerId, (InputKind, Phase)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&mut self, input: InputKind, phase: Phase) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.active.insert(id, (input, phase));
        id
    }

    fn detach(&mut self, id: ListenerId) -> bool {
        self.active.remove(&id).is_some()
    }

    fn binding(&self, id: ListenerId) -> Option<(InputKind, Phase)> {
        self.active.get(&id).copied()
    }

    /// Number of listeners bound to one input/phase pair
    pub fn count_for(&self, input: InputKind, phase: Phase) -> usize {
        self.active
            .values()
            .filter(|&&binding| binding == (input, phase))
            .count()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// What a single event did to the gesture
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", content = "rect", rename_all = "snake_case")]
pub enum GestureOutcome {
    /// No listener for this event, or a drag/end without a begin
    Ignored,
    /// Anchor recorded; any previous rectangle should be cleared
    Started,
    /// Feedback rectangle from the anchor to the current point
    Preview(DisplayRect),
    /// Released with a side at or under the minimum; discard
    TooSmall(DisplayRect),
    /// Released with a usable rectangle
    Selected(DisplayRect),
}

/// An enabled region selector.
///
/// Created by [`SelectorHandle::enable`], which attaches begin/drag/end
/// listeners for both pointer and touch. [`SelectorHandle::disable`]
/// consumes the handle and detaches exactly those listeners, so a second
/// enable can only follow a disable.
#[derive(Debug)]
pub struct SelectorHandle {
    listeners: Vec<ListenerId>,
    surface: SurfaceSize,
    min_side: f64,
    anchor: Option<Point>,
    preview: Option<DisplayRect>,
}

impl SelectorHandle {
    /// Attach all gesture listeners and size the interaction surface to
    /// the on-screen box of the displayed source.
    pub fn enable(registry: &mut ListenerRegistry, surface: SurfaceSize, min_side: f64) -> Self {
        let listeners: Vec<ListenerId> = INPUTS
            .iter()
            .flat_map(|&input| PHASES.iter().map(move |&phase| (input, phase)))
            .map(|(input, phase)| registry.attach(input, phase))
            .collect();

        debug!(
            "Selector enabled on {:.0}x{:.0} surface ({} listeners)",
            surface.width,
            surface.height,
            listeners.len()
        );

        Self {
            listeners,
            surface,
            min_side,
            anchor: None,
            preview: None,
        }
    }

    /// Detach this handle's listeners and drop any drawn rectangle
    pub fn disable(mut self, registry: &mut ListenerRegistry) {
        let mut removed = 0;
        for id in self.listeners.drain(..) {
            if registry.detach(id) {
                removed += 1;
            }
        }
        self.anchor = None;
        self.preview = None;
        debug!("Selector disabled ({} listeners removed)", removed);
    }

    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    /// Rectangle currently drawn for feedback, if any
    pub fn preview(&self) -> Option<DisplayRect> {
        self.preview
    }

    pub fn handle(&mut self, registry: &ListenerRegistry, event: GestureEvent) -> GestureOutcome {
        let bound = self
            .listeners
            .iter()
            .any(|&id| registry.binding(id) == Some((event.input, event.phase)));
        if !bound {
            return GestureOutcome::Ignored;
        }

        let point = self.surface.clamp(event.point);
        match event.phase {
            Phase::Begin => {
                self.anchor = Some(point);
                self.preview = None;
                GestureOutcome::Started
            }
            Phase::Drag => match self.anchor {
                Some(anchor) => {
                    let rect = DisplayRect::from_corners(anchor, point);
                    self.preview = Some(rect);
                    GestureOutcome::Preview(rect)
                }
                None => GestureOutcome::Ignored,
            },
            Phase::End => match self.anchor.take() {
                Some(anchor) => {
                    let rect = DisplayRect::from_corners(anchor, point);
                    if rect.exceeds(self.min_side) {
                        self.preview = Some(rect);
                        GestureOutcome::Selected(rect)
                    } else {
                        self.preview = None;
                        GestureOutcome::TooSmall(rect)
                    }
                }
                None => GestureOutcome::Ignored,
            },
        }
    }
}

impl Drop for SelectorHandle {
    fn drop(&mut self) {
        if !self.listeners.is_empty() {
            warn!(
                "Selector dropped without disable; {} listeners left attached",
                self.listeners.len()
            );
        }
    }
}
