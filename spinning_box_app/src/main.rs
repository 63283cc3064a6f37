//! Spinning box demo
//!
//! Mounts a lit box on a headless root, spins it from a frame callback and
//! feeds a short scripted pointer session through the event dispatcher.
//! Pass a `.toml` or `.ron` root configuration as the first argument to
//! override the defaults.

use std::cell::Cell;
use std::rc::Rc;

use reactive_scene::foundation::collections::PointerId;
use reactive_scene::foundation::logging;
use reactive_scene::prelude::*;
use thiserror::Error;

const FRAMES: usize = 120;
const FRAME_MS: f64 = 1000.0 / 60.0;
const SPIN_SPEED: f32 = 1.2; // radians per second

#[derive(Error, Debug)]
enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("root error: {0}")]
    Root(#[from] RootError),
}

/// Input surface that only logs what the dispatcher asks of it
struct LoggingSurface;

impl EventTarget for LoggingSurface {
    fn add_listener(&mut self, kind: NativeEventKind) {
        log::trace!("listening for {:?}", kind);
    }

    fn remove_listener(&mut self, kind: NativeEventKind) {
        log::trace!("stopped listening for {:?}", kind);
    }

    fn set_pointer_capture(&mut self, pointer_id: PointerId) {
        log::debug!("capture {:?}", pointer_id);
    }

    fn release_pointer_capture(&mut self, pointer_id: PointerId) {
        log::debug!("release {:?}", pointer_id);
    }
}

fn load_config() -> Result<RootConfig, ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => RootConfig::load_from_file(path),
        None => Ok(RootConfig::default()),
    }
}

fn spinning_box(hovered: bool, box_ref: &NodeRef, clicks: &Rc<Cell<u32>>) -> Vec<Element> {
    let color = if hovered { [1.0, 0.4, 0.7] } else { [1.0, 0.6, 0.0] };
    let counter = clicks.clone();
    vec![Element::new("group")
        .key("stage")
        .child(
            Element::new("mesh")
                .key("box")
                .node_ref(box_ref)
                .on(EventKind::Click, move |event, _| {
                    counter.set(counter.get() + 1);
                    log::info!("Box clicked at distance {:.2}", event.distance);
                })
                .child(Element::new("boxGeometry").args(vec![
                    PropValue::Float(1.5),
                    PropValue::Float(1.5),
                    PropValue::Float(1.5),
                ]))
                .child(Element::new("meshStandardMaterial").prop("color", PropValue::Color(color))),
        )
        .child(
            Element::new("pointLight")
                .key("light")
                .prop("position", Vec3::new(10.0, 10.0, 10.0))
                .prop("intensity", 1.5f32),
        )]
}

fn run() -> Result<(), AppError> {
    let config = load_config()?;
    logging::init_with_level(config.log_level.as_deref().unwrap_or("info"));
    log::info!("Starting spinning box demo ({:?} frame loop)", config.frameloop);

    let catalogue = Catalogue::global();
    register_builtins(&catalogue);
    let host = ManualFrameHost::new();
    let mut root = Root::new(config, catalogue, HeadlessRenderer::shared(), Rc::new(host.clone()))?;

    let box_ref = NodeRef::new();
    let clicks = Rc::new(Cell::new(0u32));
    root.render(spinning_box(false, &box_ref, &clicks))?;

    let spinner = box_ref.clone();
    let _spin = root.on_frame(move |ctx, delta| {
        let Some(node) = spinner.get() else { return };
        let angle = ctx
            .graph()
            .get_path(node, "rotation.y")
            .and_then(|v| v.as_f32())
            .unwrap_or(0.0);
        if let Err(e) = ctx.reconciler().set_prop(node, "rotation.y", angle + delta * SPIN_SPEED) {
            log::warn!("Failed to spin box: {}", e);
        }
    })?;

    root.on_pointer_missed(Some(Box::new(|native: &NativePointerEvent| {
        log::info!("Missed at ({}, {})", native.offset_x, native.offset_y);
    })));
    root.connect(Box::new(LoggingSurface))?;

    let (width, height) = {
        let size = root.store().size();
        (size.width, size.height)
    };
    let mut hovered = false;
    let mut rendered = 0usize;
    let mut timestamp = 0.0;
    for frame in 0..FRAMES {
        // Sweep the pointer across the surface and click twice on the way
        let x = width * (frame as f32 / FRAMES as f32);
        let y = height / 2.0;
        root.handle_native_event(&NativePointerEvent::new(NativeEventKind::PointerMove, x, y))?;
        if frame == 30 || frame == 60 {
            for kind in [NativeEventKind::PointerDown, NativeEventKind::PointerUp, NativeEventKind::Click] {
                root.handle_native_event(&NativePointerEvent::new(kind, x, y))?;
            }
        }

        let over = !root.hovered(0).is_empty();
        if over != hovered {
            hovered = over;
            root.render(spinning_box(hovered, &box_ref, &clicks))?;
        }

        if root.store().frameloop() == Frameloop::Never {
            rendered += usize::from(root.advance(timestamp)?);
        } else {
            for _ in host.take_pending() {
                rendered += usize::from(root.frame(timestamp)?);
            }
        }
        timestamp += FRAME_MS;
    }

    let angle = box_ref
        .get()
        .and_then(|node| root.reconciler().graph().get_path(node, "rotation.y"))
        .and_then(|v| v.as_f32())
        .unwrap_or(0.0);
    log::info!(
        "Done: {} frames rendered, box at {:.2} rad, {} click(s)",
        rendered,
        angle,
        clicks.get()
    );

    root.unmount();
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        log::error!("{}", e);
        eprintln!("spinning_box: {}", e);
        std::process::exit(1);
    }
}
