use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use abu_core::animation::{load_sprite_sheet, SpriteSheet};
use abu_core::vector::Vector2;

use crate::entity::EntityId;
use crate::stepper::{EntitySpawn, Stepper, StepperError};

#[derive(Debug, Deserialize, Clone)]
pub struct SceneFile {
    pub version: String,
    pub scene_id: String,
    /// Sprite sheet files, relative to the scene file.
    #[serde(default)]
    pub sheets: Vec<PathBuf>,
    pub entities: Vec<SceneEntity>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SceneEntity {
    pub name: String,
    pub sheet: String,
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
    #[serde(default)]
    pub speed: Option<[f32; 2]>,
    /// Physics box size when the sprite size is unknown.
    #[serde(default)]
    pub footprint: Option<[f32; 2]>,
    #[serde(default)]
    pub controlled: bool,
    #[serde(default)]
    pub physics_body: bool,
}

impl SceneEntity {
    /// Spawn point, if the scene gives one. A lone `x` or `y` puts the other
    /// axis at zero.
    pub fn position(&self) -> Option<Vector2> {
        match (self.x, self.y) {
            (None, None) => None,
            (x, y) => Some(Vector2::new(x.unwrap_or(0.0), y.unwrap_or(0.0))),
        }
    }
}

pub fn load_scene_from_path(scene_path: &Path) -> Result<SceneFile, String> {
    let raw = fs::read_to_string(scene_path)
        .map_err(|e| format!("Failed to read scene file {}: {e}", scene_path.display()))?;
    let scene: SceneFile = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse scene JSON {}: {e}", scene_path.display()))?;
    validate_scene(&scene)?;
    Ok(scene)
}

pub fn validate_scene(scene: &SceneFile) -> Result<(), String> {
    if scene.version != "0.1" {
        return Err(format!(
            "Scene validation failed: unsupported version '{}'",
            scene.version
        ));
    }
    if scene.entities.is_empty() {
        return Err("Scene validation failed: entities array is empty".to_string());
    }

    let mut names = HashSet::new();
    for entity in &scene.entities {
        if entity.name.is_empty() {
            return Err("Scene validation failed: entity name is empty".to_string());
        }
        if !names.insert(entity.name.as_str()) {
            return Err(format!(
                "Scene validation failed: duplicate entity name '{}'",
                entity.name
            ));
        }
        if entity.sheet.is_empty() {
            return Err(format!(
                "Scene validation failed: entity '{}' has no sheet",
                entity.name
            ));
        }
        if let Some([sx, sy]) = entity.speed {
            if !is_positive_pair(sx, sy) {
                return Err(format!(
                    "Scene validation failed: entity '{}' has invalid speed [{sx}, {sy}]",
                    entity.name
                ));
            }
        }
        if let Some([w, h]) = entity.footprint {
            if !is_positive_pair(w, h) {
                return Err(format!(
                    "Scene validation failed: entity '{}' has invalid footprint [{w}, {h}]",
                    entity.name
                ));
            }
        }
    }

    if !scene.entities.iter().any(|e| e.controlled) {
        log::warn!(
            "Scene '{}' has no controlled entity. Input will be ignored.",
            scene.scene_id
        );
    }
    Ok(())
}

fn is_positive_pair(a: f32, b: f32) -> bool {
    a.is_finite() && b.is_finite() && a > 0.0 && b > 0.0
}

/// Load every sheet the scene lists, resolving paths against the scene
/// file's directory. Every entity's sheet must be provided by one of them.
pub fn load_scene_sheets(scene_path: &Path, scene: &SceneFile) -> Result<Vec<SpriteSheet>, String> {
    let base = scene_path.parent().unwrap_or_else(|| Path::new("."));
    let sheets = scene
        .sheets
        .iter()
        .map(|sheet| load_sprite_sheet(&base.join(sheet)))
        .collect::<Result<Vec<_>, String>>()?;
    validate_scene_sheets(scene, &sheets)?;
    Ok(sheets)
}

pub fn validate_scene_sheets(scene: &SceneFile, sheets: &[SpriteSheet]) -> Result<(), String> {
    let loaded: HashSet<&str> = sheets.iter().map(|s| s.sheet_id.as_str()).collect();
    for entity in &scene.entities {
        if !loaded.contains(entity.sheet.as_str()) {
            return Err(format!(
                "Scene validation failed: entity '{}' uses sheet '{}' which no listed sheet file provides",
                entity.name, entity.sheet
            ));
        }
    }
    Ok(())
}

/// Spawn the scene's entities in file order. Physics bodies are only bound
/// when the stepper has a physics world attached.
pub fn spawn_scene(stepper: &mut Stepper, scene: &SceneFile) -> Result<Vec<EntityId>, StepperError> {
    let mut spawned = Vec::with_capacity(scene.entities.len());
    for entry in &scene.entities {
        let mut spawn = EntitySpawn::new(&entry.name, &entry.sheet);
        if let Some(position) = entry.position() {
            spawn = spawn.at(position);
        }
        if let Some([sx, sy]) = entry.speed {
            spawn = spawn.speed(Vector2::new(sx, sy));
        }
        if let Some([w, h]) = entry.footprint {
            spawn = spawn.footprint(Vector2::new(w, h));
        }
        if entry.controlled {
            spawn = spawn.controlled();
        }
        let id = stepper.spawn(spawn)?;

        if entry.physics_body {
            if stepper.physics().is_some() {
                stepper.attach_body(id)?;
            } else {
                log::warn!(
                    "Entity '{}' wants a physics body but no physics world is attached",
                    entry.name
                );
            }
        }
        spawned.push(id);
    }
    log::info!(
        "Scene '{}' spawned {} entities",
        scene.scene_id,
        spawned.len()
    );
    Ok(spawned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::RapierWorld;
    use crate::render::SheetRenderer;
    use abu_core::animation::parse_sprite_sheet;
    use abu_core::config::LoopConfig;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file_path(name_hint: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "abu_scene_test_{}_{}_{}.json",
            name_hint,
            std::process::id(),
            nanos
        ))
    }

    fn write_scene_file(path: &Path, body: &str) {
        fs::write(path, body).expect("failed to write temp scene file");
    }

    const SHEET_JSON: &str = r#"
    {
      "version": "0.1",
      "sheet_id": "Abu",
      "frame_width": 32,
      "frame_height": 48,
      "clips": {
        "AbuIdleRight": { "frames": [{ "sprite_id": "AbuIdleRight_0.png", "duration_ms": 100 }] }
      }
    }
    "#;

    fn parse(json: &str) -> SceneFile {
        serde_json::from_str(json).expect("scene json parses")
    }

    #[test]
    fn load_scene_from_path_parses_valid_scene() {
        let path = temp_file_path("valid");
        let json = r#"
        {
          "version": "0.1",
          "scene_id": "courtyard",
          "sheets": ["abu.json"],
          "entities": [
            { "name": "abu", "sheet": "Abu", "x": 10.0, "y": 20.0, "controlled": true },
            { "name": "guard", "sheet": "Abu", "speed": [2.0, 3.0], "physics_body": true }
          ]
        }
        "#;
        write_scene_file(&path, json);

        let scene = load_scene_from_path(&path).expect("scene should load");
        assert_eq!(scene.scene_id, "courtyard");
        assert_eq!(scene.entities.len(), 2);
        assert_eq!(scene.entities[0].position(), Some(Vector2::new(10.0, 20.0)));
        assert!(scene.entities[0].controlled);
        assert_eq!(scene.entities[1].position(), None);
        assert!(scene.entities[1].physics_body);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn load_scene_from_path_rejects_duplicate_names() {
        let path = temp_file_path("duplicate_name");
        let json = r#"
        {
          "version": "0.1",
          "scene_id": "bad",
          "entities": [
            { "name": "abu", "sheet": "Abu" },
            { "name": "abu", "sheet": "Abu" }
          ]
        }
        "#;
        write_scene_file(&path, json);

        let err = load_scene_from_path(&path).expect_err("duplicate names should fail");
        assert!(err.contains("duplicate entity name 'abu'"));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn validate_scene_rejects_empty_and_negative_speed() {
        let empty = parse(r#"{ "version": "0.1", "scene_id": "e", "entities": [] }"#);
        assert!(validate_scene(&empty).is_err());

        let negative = parse(
            r#"{ "version": "0.1", "scene_id": "n",
                 "entities": [{ "name": "abu", "sheet": "Abu", "speed": [-1.0, 5.0] }] }"#,
        );
        let err = validate_scene(&negative).expect_err("negative speed should fail");
        assert!(err.contains("invalid speed"));
    }

    #[test]
    fn validate_scene_rejects_zero_speed_and_footprint() {
        let zero_speed = parse(
            r#"{ "version": "0.1", "scene_id": "z",
                 "entities": [{ "name": "abu", "sheet": "Abu", "speed": [0.0, 0.0] }] }"#,
        );
        let err = validate_scene(&zero_speed).expect_err("zero speed should fail");
        assert!(err.contains("invalid speed"));

        let flat = parse(
            r#"{ "version": "0.1", "scene_id": "f",
                 "entities": [{ "name": "abu", "sheet": "Abu", "footprint": [32.0, 0.0] }] }"#,
        );
        let err = validate_scene(&flat).expect_err("zero footprint should fail");
        assert!(err.contains("invalid footprint"));
    }

    #[test]
    fn validate_scene_rejects_unknown_version() {
        let scene = parse(
            r#"{ "version": "2.0", "scene_id": "v",
                 "entities": [{ "name": "abu", "sheet": "Abu" }] }"#,
        );
        let err = validate_scene(&scene).expect_err("unknown version should fail");
        assert!(err.contains("unsupported version '2.0'"));
    }

    #[test]
    fn entity_sheets_must_come_from_listed_files() {
        let sheets = vec![parse_sprite_sheet(SHEET_JSON).expect("valid sheet")];
        let good = parse(
            r#"{ "version": "0.1", "scene_id": "g",
                 "entities": [{ "name": "abu", "sheet": "Abu" }] }"#,
        );
        assert!(validate_scene_sheets(&good, &sheets).is_ok());

        let bad = parse(
            r#"{ "version": "0.1", "scene_id": "b",
                 "entities": [{ "name": "abu", "sheet": "Abu" }, { "name": "zed", "sheet": "Zed" }] }"#,
        );
        let err = validate_scene_sheets(&bad, &sheets).expect_err("unlisted sheet should fail");
        assert!(err.contains("entity 'zed' uses sheet 'Zed'"));
    }

    #[test]
    fn lone_axis_defaults_other_to_zero() {
        let scene = parse(
            r#"{ "version": "0.1", "scene_id": "x",
                 "entities": [{ "name": "abu", "sheet": "Abu", "y": 7.0 }] }"#,
        );
        assert_eq!(scene.entities[0].position(), Some(Vector2::new(0.0, 7.0)));
    }

    #[test]
    fn load_scene_sheets_resolves_relative_to_scene() {
        let scene_path = temp_file_path("with_sheet");
        let sheet_name = format!(
            "{}_sheet.json",
            scene_path
                .file_stem()
                .and_then(|s| s.to_str())
                .expect("temp name is utf-8")
        );
        let sheet_path = scene_path.with_file_name(&sheet_name);
        fs::write(&sheet_path, SHEET_JSON).expect("failed to write temp sheet file");

        let scene = parse(&format!(
            r#"{{ "version": "0.1", "scene_id": "s", "sheets": ["{sheet_name}"],
                  "entities": [{{ "name": "abu", "sheet": "Abu" }}] }}"#
        ));
        let sheets = load_scene_sheets(&scene_path, &scene).expect("sheet should load");
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].sheet_id, "Abu");

        let _ = fs::remove_file(sheet_path);
    }

    #[test]
    fn spawn_scene_binds_bodies_when_physics_is_attached() {
        let mut renderer = SheetRenderer::new(&["main-lp"]);
        renderer.add_sheet(parse_sprite_sheet(SHEET_JSON).expect("valid sheet"));
        let config = LoopConfig::default();
        let mut stepper = Stepper::new(config.clone(), Box::new(renderer)).expect("valid config");
        stepper
            .attach_physics(Box::new(RapierWorld::new(&config.physics)))
            .expect("no bodies yet");

        let scene = parse(
            r#"{ "version": "0.1", "scene_id": "s",
                 "entities": [
                   { "name": "abu", "sheet": "Abu", "x": 4.0, "y": 4.0, "controlled": true },
                   { "name": "crate", "sheet": "Abu", "x": 50.0, "y": 0.0, "physics_body": true }
                 ] }"#,
        );
        let ids = spawn_scene(&mut stepper, &scene).expect("scene spawns");
        assert_eq!(ids.len(), 2);

        let abu = stepper.entity(ids[0]).expect("abu exists");
        assert!(abu.body().is_none());
        let body = stepper
            .entity(ids[1])
            .and_then(|e| e.body())
            .expect("crate has a body");
        assert_eq!(stepper.entity_for_body(body), Some(ids[1]));
        assert_eq!(
            stepper.entity_position(ids[1]),
            Some(Vector2::new(50.0, 0.0))
        );
    }

    #[test]
    fn spawn_scene_fails_on_unknown_sheet() {
        let renderer = SheetRenderer::new(&["main-lp"]);
        let mut stepper =
            Stepper::new(LoopConfig::default(), Box::new(renderer)).expect("valid config");
        let scene = parse(
            r#"{ "version": "0.1", "scene_id": "s",
                 "entities": [{ "name": "abu", "sheet": "Abu" }] }"#,
        );
        assert!(matches!(
            spawn_scene(&mut stepper, &scene),
            Err(StepperError::Render(_))
        ));
    }
}
