//! Template-related utility methods.

use handlebars::{Context, Handlebars, Helper, HelperResult, JsonRender, Output, RenderContext, RenderError};
use serde_json::Value as JsonValue;

/// Registers all of our helpers with the given registry.
pub fn register_helpers(hb: &mut Handlebars) {
    hb.register_helper("join", Box::new(join));
    hb.register_helper("coord", Box::new(coord));
}

/// Joins the elements of an array with a separator.
///
/// Usage:
///
/// ```handlebars
/// {{ join selection_color "," }}
/// ```
///
/// Produces `255,255,0,255`. A missing or `null` array renders nothing.
pub fn join(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let separator = h
        .param(1)
        .and_then(|p| p.value().as_str())
        .unwrap_or(",");
    let items = match h.param(0).map(|p| p.value()) {
        Some(JsonValue::Array(items)) => items,
        Some(JsonValue::Null) | None => return Ok(()),
        Some(other) => {
            return Err(RenderError::new(format!(
                "join: expected an array, but got {}",
                other
            )))
        }
    };
    let joined = items
        .iter()
        .map(|item| match item {
            JsonValue::Number(_) => format_coord(item),
            _ => item.render(),
        })
        .collect::<Vec<String>>()
        .join(separator);
    out.write(&joined)?;
    Ok(())
}

/// Formats a number, leaving off the fractional part of integral values.
///
/// Usage:
///
/// ```handlebars
/// {{ coord extent.[0] }}
/// ```
pub fn coord(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h
        .param(0)
        .map(|p| p.value())
        .ok_or_else(|| RenderError::new("coord: missing parameter"))?;
    out.write(&format_coord(value))?;
    Ok(())
}

fn format_coord(value: &JsonValue) -> String {
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => format!("{}", f),
        None => value.render(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn registry() -> Handlebars<'static> {
        let mut hb = Handlebars::new();
        register_helpers(&mut hb);
        hb
    }

    #[test]
    fn join_formats_numbers_and_strings() {
        let hb = registry();
        let data = json!({ "color": [255, 255, 0, 255], "crs": ["EPSG:2056", "EPSG:4326"] });
        assert_eq!(
            hb.render_template("{{join color \",\"}}", &data).unwrap(),
            "255,255,0,255"
        );
        assert_eq!(
            hb.render_template("{{join crs \" \"}}", &data).unwrap(),
            "EPSG:2056 EPSG:4326"
        );
        assert_eq!(hb.render_template("{{join missing}}", &data).unwrap(), "");
    }

    #[test]
    fn coord_drops_integral_fraction() {
        let hb = registry();
        let data = json!({ "extent": [2590983.0, 1212806.5] });
        assert_eq!(
            hb.render_template("{{coord extent.[0]}} {{coord extent.[1]}}", &data)
                .unwrap(),
            "2590983 1212806.5"
        );
    }
}
