//! Scenario tests across the reconciler, store, scheduler and dispatcher
//!
//! Each scenario mounts a full [`Root`] with a headless renderer, a manual
//! frame host and a private catalogue, so tests never share registrations.

mod event_scenarios;
mod reconciler_scenarios;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::catalogue::Catalogue;
use crate::core::RootConfig;
use crate::engine::{register_builtins, EngineObject, PropValue};
use crate::events::{EventTarget, NativeEventKind};
use crate::foundation::collections::PointerId;
use crate::foundation::logging;
use crate::foundation::math::Vec3;
use crate::reconciler::Element;
use crate::render::HeadlessRenderer;
use crate::scheduler::ManualFrameHost;
use crate::Root;

/// Root plus the test doubles it was built with
pub(crate) struct Harness {
    pub root: Root,
    pub host: ManualFrameHost,
    pub renderer: Rc<RefCell<HeadlessRenderer>>,
    pub constructed: Rc<Cell<usize>>,
}

pub(crate) fn harness(config: RootConfig) -> Harness {
    logging::init_for_tests();
    let catalogue = Catalogue::new();
    register_builtins(&catalogue);

    // Counting variant of the box geometry
    let constructed = Rc::new(Cell::new(0));
    let counter = constructed.clone();
    catalogue.register_with_arity("countedBox", 3, move |args| {
        counter.set(counter.get() + 1);
        let size = args.first().and_then(PropValue::as_f32).unwrap_or(1.0);
        Ok(Box::new(EngineObject::box_geometry(size, size, size)))
    });

    let host = ManualFrameHost::new();
    let renderer = HeadlessRenderer::shared();
    let root = Root::new(config, catalogue, renderer.clone(), Rc::new(host.clone()))
        .expect("default test config is valid");
    Harness {
        root,
        host,
        renderer,
        constructed,
    }
}

impl Harness {
    /// Serve every pending animation frame once
    pub fn pump(&mut self, timestamp_ms: f64) -> usize {
        let mut rendered = 0;
        for _ in self.host.take_pending() {
            if self.root.frame(timestamp_ms).unwrap_or(false) {
                rendered += 1;
            }
        }
        rendered
    }

    pub fn frames(&self) -> u64 {
        self.renderer.borrow().frames()
    }
}

/// Unit cube mesh at `z`, facing the default camera at `z = 5`
pub(crate) fn cube(z: f32) -> Element {
    Element::new("mesh")
        .prop("position", Vec3::new(0.0, 0.0, z))
        .child(Element::new("boxGeometry"))
        .child(Element::new("meshBasicMaterial"))
}

/// Shared call log for handlers
pub(crate) type CallLog = Rc<RefCell<Vec<String>>>;

pub(crate) fn call_log() -> CallLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Input surface that records listener and capture calls
#[derive(Clone, Default)]
pub(crate) struct RecordingTarget {
    pub listeners: Rc<RefCell<Vec<NativeEventKind>>>,
    pub captured: Rc<RefCell<Vec<PointerId>>>,
}

impl EventTarget for RecordingTarget {
    fn add_listener(&mut self, kind: NativeEventKind) {
        self.listeners.borrow_mut().push(kind);
    }

    fn remove_listener(&mut self, kind: NativeEventKind) {
        self.listeners.borrow_mut().retain(|k| *k != kind);
    }

    fn set_pointer_capture(&mut self, pointer_id: PointerId) {
        self.captured.borrow_mut().push(pointer_id);
    }

    fn release_pointer_capture(&mut self, pointer_id: PointerId) {
        self.captured.borrow_mut().retain(|p| *p != pointer_id);
    }
}
