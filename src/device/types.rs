use serde::{Deserialize, Serialize};

/// Connection state of a device for the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// A device the bridge tool can talk to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Bridge serial (e.g. `emulator-5554`, `R58M123ABC`)
    pub id: String,
    pub display_name: String,
    pub connection_state: ConnectionState,
}

/// One raw line of the bridge device listing, before authorization filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub serial: String,
    /// `device`, `offline`, `unauthorized`, `no`, ...
    pub state: String,
    pub model: Option<String>,
}

impl DeviceEntry {
    pub fn new(serial: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            state: state.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Only `device` entries accept commands; everything else is offline or unauthorized
    pub fn is_authorized(&self) -> bool {
        self.state == "device"
    }

    pub fn display_name(&self) -> String {
        match &self.model {
            Some(model) if !model.is_empty() => model.replace('_', " "),
            _ => self.serial.clone(),
        }
    }
}

/// Absolute screen coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Bounding rectangle in screen pixels, serialized by uiautomator as `[x1,y1][x2,y2]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Bounds {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Parse the uiautomator `bounds` attribute
    pub fn parse(raw: &str) -> Option<Self> {
        let inner = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
        let (first, second) = inner.split_once("][")?;
        let (x1, y1) = parse_pair(first)?;
        let (x2, y2) = parse_pair(second)?;
        Some(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    pub fn is_visible(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }
}

fn parse_pair(raw: &str) -> Option<(i32, i32)> {
    let (x, y) = raw.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// A node of a hierarchy snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiElement {
    /// Position in document order
    pub index: usize,
    /// Nesting level below the hierarchy root
    pub depth: usize,
    pub text: String,
    pub resource_id: String,
    pub content_desc: String,
    pub class_name: String,
    pub package: String,
    pub clickable: bool,
    pub enabled: bool,
    pub focused: bool,
    pub bounds: Bounds,
}

impl UiElement {
    pub fn new(index: usize, depth: usize) -> Self {
        Self {
            index,
            depth,
            text: String::new(),
            resource_id: String::new(),
            content_desc: String::new(),
            class_name: String::new(),
            package: String::new(),
            clickable: false,
            enabled: true,
            focused: false,
            bounds: Bounds::default(),
        }
    }

    /// Text inputs are `EditText` or one of its subclasses
    pub fn is_editable(&self) -> bool {
        self.class_name.contains("EditText")
    }

    /// Short class name without the `android.widget.` prefix
    pub fn short_class(&self) -> &str {
        self.class_name
            .rsplit('.')
            .next()
            .unwrap_or(self.class_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_parse_and_center() {
        let bounds = Bounds::parse("[800,1400][950,1480]").unwrap();
        assert_eq!(bounds, Bounds::new(800, 1400, 950, 1480));
        assert_eq!(bounds.width(), 150);
        assert_eq!(bounds.height(), 80);
        assert_eq!(bounds.center(), Point::new(875, 1440));
    }

    #[test]
    fn test_bounds_parse_rejects_garbage() {
        assert!(Bounds::parse("").is_none());
        assert!(Bounds::parse("[1,2]").is_none());
        assert!(Bounds::parse("[a,b][c,d]").is_none());
    }

    #[test]
    fn test_device_entry_display_name() {
        let entry = DeviceEntry::new("R58M123ABC", "device").with_model("Pixel_7_Pro");
        assert_eq!(entry.display_name(), "Pixel 7 Pro");
        assert!(entry.is_authorized());

        let bare = DeviceEntry::new("emulator-5554", "unauthorized");
        assert_eq!(bare.display_name(), "emulator-5554");
        assert!(!bare.is_authorized());
    }

    #[test]
    fn test_element_short_class() {
        let mut element = UiElement::new(0, 1);
        element.class_name = "android.widget.EditText".to_string();
        assert_eq!(element.short_class(), "EditText");
        assert!(element.is_editable());
    }
}
