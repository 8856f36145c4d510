//! Fixtures shared by unit tests: hierarchy XML builders and a scripted bridge

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use super::bridge::{BridgeError, DeviceBridge, KeyCode};
use super::types::{Bounds, DeviceEntry, Point, ScreenSize};

pub const MESSAGING_PACKAGE: &str = "com.google.android.apps.messaging";
pub const LAUNCHER_PACKAGE: &str = "com.android.launcher3";

/// Builder for one `<node>` of a uiautomator dump
#[derive(Debug, Clone)]
pub struct NodeSpec {
    class: String,
    text: String,
    resource_id: String,
    content_desc: String,
    package: Option<String>,
    clickable: bool,
    enabled: bool,
    focused: bool,
    bounds: Bounds,
}

impl NodeSpec {
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            text: String::new(),
            resource_id: String::new(),
            content_desc: String::new(),
            package: None,
            clickable: false,
            enabled: true,
            focused: false,
            bounds: Bounds::new(0, 0, 100, 100),
        }
    }

    pub fn button(text: &str) -> Self {
        Self::new("android.widget.Button").text(text).clickable(true)
    }

    pub fn edit_text(text: &str, resource_id: &str) -> Self {
        Self::new("android.widget.EditText")
            .text(text)
            .id(resource_id)
            .clickable(true)
    }

    pub fn text_view(text: &str) -> Self {
        Self::new("android.widget.TextView").text(text)
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn id(mut self, resource_id: &str) -> Self {
        self.resource_id = resource_id.to_string();
        self
    }

    pub fn desc(mut self, content_desc: &str) -> Self {
        self.content_desc = content_desc.to_string();
        self
    }

    pub fn package(mut self, package: &str) -> Self {
        self.package = Some(package.to_string());
        self
    }

    pub fn clickable(mut self, clickable: bool) -> Self {
        self.clickable = clickable;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    pub fn bounds(mut self, x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        self.bounds = Bounds::new(x1, y1, x2, y2);
        self
    }

    fn to_xml(&self, index: usize, default_package: &str) -> String {
        let b = &self.bounds;
        format!(
            r#"<node index="{}" text="{}" resource-id="{}" class="{}" package="{}" content-desc="{}" clickable="{}" enabled="{}" focused="{}" bounds="[{},{}][{},{}]" />"#,
            index,
            escape(&self.text),
            escape(&self.resource_id),
            escape(&self.class),
            escape(self.package.as_deref().unwrap_or(default_package)),
            escape(&self.content_desc),
            self.clickable,
            self.enabled,
            self.focused,
            b.x1,
            b.y1,
            b.x2,
            b.y2
        )
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A full-screen dump whose root belongs to `package`
pub fn screen_in(package: &str, nodes: &[NodeSpec]) -> String {
    let children: Vec<String> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| n.to_xml(i, package))
        .collect();

    format!(
        r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation="0"><node index="0" text="" resource-id="" class="android.widget.FrameLayout" package="{}" content-desc="" clickable="false" enabled="true" focused="false" bounds="[0,0][1080,2280]">{}</node></hierarchy>"#,
        package,
        children.join("")
    )
}

/// A dump of the messaging app
pub fn compose_screen(nodes: &[NodeSpec]) -> String {
    screen_in(MESSAGING_PACKAGE, nodes)
}

/// Minimal valid PNG
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgba8(image::RgbaImage::new(width, height));
    let mut cursor = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, image::ImageFormat::Png)
        .expect("encode png");
    cursor.into_inner()
}

/// Scripted [`DeviceBridge`] that records every call
///
/// Dumps are served from a queue; the last queued dump repeats forever.
pub struct FakeBridge {
    devices: Mutex<Vec<DeviceEntry>>,
    screen_on: AtomicBool,
    foreground: Mutex<Option<String>>,
    free_kb: AtomicU64,
    launch_ok: AtomicBool,
    screen: Mutex<Option<ScreenSize>>,
    dumps: Mutex<VecDeque<String>>,
    dump_failures: AtomicU32,
    fail_dumps_after_tap: AtomicBool,
    screenshot_ok: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeBridge {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(vec![
                DeviceEntry::new("emulator-5554", "device").with_model("Pixel_7")
            ]),
            screen_on: AtomicBool::new(true),
            foreground: Mutex::new(Some(LAUNCHER_PACKAGE.to_string())),
            free_kb: AtomicU64::new(1_000_000),
            launch_ok: AtomicBool::new(true),
            screen: Mutex::new(Some(ScreenSize::new(1080, 2280))),
            dumps: Mutex::new(VecDeque::new()),
            dump_failures: AtomicU32::new(0),
            fail_dumps_after_tap: AtomicBool::new(false),
            screenshot_ok: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_devices(&self, devices: Vec<DeviceEntry>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn set_screen_on(&self, on: bool) {
        self.screen_on.store(on, Ordering::SeqCst);
    }

    pub fn set_foreground(&self, package: Option<&str>) {
        *self.foreground.lock().unwrap() = package.map(str::to_string);
    }

    pub fn set_free_kb(&self, kb: u64) {
        self.free_kb.store(kb, Ordering::SeqCst);
    }

    pub fn set_launch_ok(&self, ok: bool) {
        self.launch_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_screen_size(&self, size: Option<ScreenSize>) {
        *self.screen.lock().unwrap() = size;
    }

    pub fn push_dump(&self, xml: String) {
        self.dumps.lock().unwrap().push_back(xml);
    }

    pub fn fail_next_dumps(&self, count: u32) {
        self.dump_failures.store(count, Ordering::SeqCst);
    }

    /// Every dump after the first tap times out
    pub fn fail_dumps_after_tap(&self) {
        self.fail_dumps_after_tap.store(true, Ordering::SeqCst);
    }

    pub fn set_screenshot_ok(&self, ok: bool) {
        self.screenshot_ok.store(ok, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn taps(&self) -> Vec<Point> {
        self.calls()
            .iter()
            .filter_map(|c| c.strip_prefix("tap "))
            .filter_map(|xy| {
                let (x, y) = xy.split_once(',')?;
                Some(Point::new(x.parse().ok()?, y.parse().ok()?))
            })
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DeviceBridge for FakeBridge {
    async fn list_devices(&self) -> Result<Vec<DeviceEntry>, BridgeError> {
        self.record("list_devices".to_string());
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn is_screen_on(&self, _serial: &str) -> Result<bool, BridgeError> {
        self.record("is_screen_on".to_string());
        Ok(self.screen_on.load(Ordering::SeqCst))
    }

    async fn key_event(&self, _serial: &str, key: KeyCode) -> Result<(), BridgeError> {
        self.record(format!("key_event {}", key.as_keyevent()));
        match key {
            KeyCode::Wakeup => self.set_screen_on(true),
            KeyCode::Home => self.set_foreground(Some(LAUNCHER_PACKAGE)),
        }
        Ok(())
    }

    async fn open_compose(&self, _serial: &str, number: &str, _body: &str) -> Result<bool, BridgeError> {
        self.record(format!("open_compose {}", number));
        Ok(self.launch_ok.load(Ordering::SeqCst))
    }

    async fn dump_hierarchy(&self, _serial: &str) -> Result<String, BridgeError> {
        self.record("dump".to_string());

        let remaining = self.dump_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.dump_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BridgeError::Timeout {
                command: "adb exec-out uiautomator dump /dev/tty".to_string(),
                timeout_ms: 20_000,
            });
        }

        let mut dumps = self.dumps.lock().unwrap();
        let xml = if dumps.len() > 1 {
            dumps.pop_front()
        } else {
            dumps.front().cloned()
        };
        Ok(xml.unwrap_or_else(|| screen_in(LAUNCHER_PACKAGE, &[])))
    }

    async fn tap(&self, _serial: &str, point: Point) -> Result<(), BridgeError> {
        self.record(format!("tap {},{}", point.x, point.y));
        if self.fail_dumps_after_tap.load(Ordering::SeqCst) {
            self.dump_failures.store(u32::MAX, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn type_text(&self, _serial: &str, text: &str) -> Result<(), BridgeError> {
        self.record(format!("type_text {}", text));
        Ok(())
    }

    async fn screen_size(&self, _serial: &str) -> Result<ScreenSize, BridgeError> {
        self.record("screen_size".to_string());
        (*self.screen.lock().unwrap()).ok_or_else(|| BridgeError::Unparsable {
            command: "adb shell wm size".to_string(),
            detail: "no size line".to_string(),
            output: String::new(),
        })
    }

    async fn foreground_package(&self, _serial: &str) -> Result<Option<String>, BridgeError> {
        self.record("foreground_package".to_string());
        Ok(self.foreground.lock().unwrap().clone())
    }

    async fn free_storage_kb(&self, _serial: &str) -> Result<u64, BridgeError> {
        self.record("free_storage_kb".to_string());
        Ok(self.free_kb.load(Ordering::SeqCst))
    }

    async fn screenshot(&self, _serial: &str) -> Result<Vec<u8>, BridgeError> {
        self.record("screenshot".to_string());
        if !self.screenshot_ok.load(Ordering::SeqCst) {
            return Err(BridgeError::NonZeroExit {
                command: "adb exec-out screencap -p".to_string(),
                code: Some(1),
                stdout: String::new(),
                stderr: "screencap: permission denied".to_string(),
            });
        }
        Ok(png_bytes(4, 8))
    }
}
