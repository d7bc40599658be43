use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Id the device reports for its own controller unit.
pub const CONTROLLER_PANEL_ID: &str = "0";

/// Layout `shapeType` code of triangle panels.
pub const TRIANGLE_SHAPE_TYPE: &str = "9";

/// Device-assigned panel id, kept as text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelId(String);

impl PanelId {
    pub fn new(id: impl Into<String>) -> Self {
        PanelId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PanelId {
    fn from(id: String) -> Self {
        PanelId(id)
    }
}

impl From<&str> for PanelId {
    fn from(id: &str) -> Self {
        PanelId::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeClass {
    Triangle,
    Other,
}

impl ShapeClass {
    pub fn from_shape_type(code: &str) -> Self {
        if code == TRIANGLE_SHAPE_TYPE {
            ShapeClass::Triangle
        } else {
            ShapeClass::Other
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutResponse {
    position_data: Vec<PositionEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionEntry {
    #[serde(default)]
    panel_id: Value,
    #[serde(default)]
    shape_type: Value,
}

/// Panels from the last layout fetch, split by shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelInventory {
    panels: Vec<PanelId>,
    triangles: Vec<PanelId>,
}

impl PanelInventory {
    /// Reads `positionData[].panelId/shapeType` from a layout body. The
    /// controller entry is skipped.
    pub fn from_layout(body: Value) -> Result<Self, serde_json::Error> {
        let layout: LayoutResponse = serde_json::from_value(body)?;
        let mut inventory = PanelInventory::default();

        for entry in layout.position_data {
            let Some(id) = scalar_text(&entry.panel_id) else {
                debug!("Skipping layout entry without a panel id");
                continue;
            };
            if id == CONTROLLER_PANEL_ID {
                continue;
            }
            let shape = scalar_text(&entry.shape_type)
                .map(|code| ShapeClass::from_shape_type(&code))
                .unwrap_or(ShapeClass::Other);
            inventory.insert(PanelId::new(id), shape);
        }

        Ok(inventory)
    }

    pub fn insert(&mut self, id: PanelId, shape: ShapeClass) {
        match shape {
            ShapeClass::Triangle => self.triangles.push(id),
            ShapeClass::Other => self.panels.push(id),
        }
    }

    /// Non-triangle panels.
    pub fn panels(&self) -> &[PanelId] {
        &self.panels
    }

    pub fn triangles(&self) -> &[PanelId] {
        &self.triangles
    }

    pub fn is_triangle(&self, id: &PanelId) -> bool {
        self.triangles.contains(id)
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.panels.is_empty() && self.triangles.is_empty()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn layout_is_split_by_shape_and_skips_controller() {
        let body = json!({
            "numPanels": 4,
            "positionData": [
                {"panelId": 0, "x": 0, "y": 0, "o": 0, "shapeType": 12},
                {"panelId": 101, "x": 10, "y": 0, "o": 0, "shapeType": 7},
                {"panelId": "202", "x": 20, "y": 0, "o": 60, "shapeType": "9"},
                {"panelId": 303, "x": 30, "y": 0, "o": 0, "shapeType": 9}
            ]
        });

        let inventory = PanelInventory::from_layout(body).unwrap();

        assert_eq!(inventory.panels(), &[PanelId::from("101")]);
        assert_eq!(inventory.triangles(), &[PanelId::from("202"), PanelId::from("303")]);
        assert!(inventory.is_triangle(&"202".into()));
        assert!(!inventory.is_triangle(&"999".into()));
    }

    #[test]
    fn missing_position_data_is_an_error() {
        assert!(PanelInventory::from_layout(json!({"numPanels": 0})).is_err());
    }

    #[test]
    fn entries_without_ids_are_ignored() {
        let body = json!({"positionData": [{"shapeType": 9}, {"panelId": null}]});
        assert!(PanelInventory::from_layout(body).unwrap().is_empty());
    }
}
