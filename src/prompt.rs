//! Coloring-page prompt assembly.
//!
//! A pure decision table: page type, name/message, per-photo labels,
//! background, and scene description map to one fixed prompt string with the
//! supplied text interpolated verbatim. Every combination produces a
//! non-empty prompt; unmatched inputs get [`FALLBACK_PROMPT`].

use std::str::FromStr;

use crate::error::ColorpageError;

/// Prompt used when the inputs don't match any known page/background shape.
pub const FALLBACK_PROMPT: &str = "turn the attached photo into a line drawing suitable for a coloring page, ensuring accurate facial features are maintained";

/// The kinds of coloring page the form offers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PageType {
    /// The whole photo traced as-is
    StraightCopy,
    /// Faces cut out into framed boxes
    FacialPortrait,
    /// Faces placed onto cartoon bodies
    CartoonPortrait,
}

impl FromStr for PageType {
    type Err = ColorpageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "straight-copy" => Ok(PageType::StraightCopy),
            "facial-portrait" => Ok(PageType::FacialPortrait),
            "cartoon-portrait" => Ok(PageType::CartoonPortrait),
            other => Err(ColorpageError::BadRequest(format!(
                "Unknown coloring page type: {}",
                other
            ))),
        }
    }
}

/// Canvas size for the requested page orientation; anything other than
/// `landscape` (including a missing value) gets the portrait canvas.
pub fn canvas_size_for(orientation: Option<&str>) -> &'static str {
    match orientation {
        Some("landscape") => "1536x1024",
        _ => "1024x1536",
    }
}

/// Builds the prompt sent to the image vendor for a coloring-page request.
///
/// `individual_labels` carries one slot per attached photo: person names for
/// facial portraits, activity descriptions for cartoon portraits. The scene
/// description only matters for cartoon portraits on a `scene` background;
/// when it is absent there, the generic fallback prompt is returned rather
/// than an error.
pub fn generate_prompt(
    page_type: &str,
    name_or_message: &str,
    individual_labels: &[String],
    background: &str,
    scene_description: Option<&str>,
) -> String {
    let has_name = !name_or_message.trim().is_empty();
    let has_activity = individual_labels
        .first()
        .map(|label| !label.trim().is_empty())
        .unwrap_or(false);

    match page_type {
        "straight-copy" => straight_copy_prompt(has_name, name_or_message),
        "facial-portrait" => {
            facial_portrait_prompt(has_name, name_or_message, individual_labels, background)
        }
        "cartoon-portrait" => cartoon_portrait_prompt(
            has_name,
            has_activity,
            name_or_message,
            individual_labels,
            background,
            scene_description,
        ),
        _ => FALLBACK_PROMPT.to_string(),
    }
}

fn straight_copy_prompt(has_name: bool, name_or_message: &str) -> String {
    if !has_name {
        "turn the attached photo into a line drawing suitable for a coloring page, ensuring accurate facial features are maintained. place the result, as large as possible whilst still looking elegant, centered vertically and horizontally on a plain white background".to_string()
    } else {
        format!(
            "turn the attached photo into a line drawing suitable for a coloring page, ensuring accurate facial features are maintained. write {} in friendly white letters with black outline, suited to a coloring page. place the writing unobtrusively on top of the line drawing, ensuring it doesn't obscure the subject's face. finally center the whole thing, as large as possible whilst still looking elegant, on a plain white background.",
            name_or_message
        )
    }
}

/// Per-photo "below the box from photo N write {name}" clauses for the
/// multi-photo facial portrait, empty when no labels were supplied.
fn boxed_names_clause(individual_labels: &[String]) -> String {
    let names = individual_labels
        .iter()
        .enumerate()
        .filter(|(_, name)| !name.trim().is_empty())
        .map(|(idx, name)| format!("below the box from photo {} write {}", idx + 1, name))
        .collect::<Vec<_>>()
        .join(", ");
    if names.is_empty() {
        String::new()
    } else {
        format!(" {} in friendly white letters with black outline.", names)
    }
}

fn facial_portrait_prompt(
    has_name: bool,
    name_or_message: &str,
    individual_labels: &[String],
    background: &str,
) -> String {
    let num_photos = individual_labels.len();
    let multiple = num_photos > 1;
    let names_desc = if multiple {
        boxed_names_clause(individual_labels)
    } else {
        String::new()
    };

    let backdrop = match background {
        "plain" => "on a plain white background",
        "mindful-pattern" => "on top of an abstract pattern suitable for mindful coloring",
        _ => return FALLBACK_PROMPT.to_string(),
    };

    match (has_name, multiple) {
        (false, true) => format!(
            "turn the faces from the attached {} photos into line drawings suitable for a coloring page, ensuring accurate facial features are maintained. place each result inside its own plain white box with a black outline.{} arrange all boxes elegantly {}",
            num_photos, names_desc, backdrop
        ),
        (false, false) => match background {
            "plain" => "turn the face from the attached photo into a line drawing suitable for a coloring page, ensuring accurate facial features are maintained. place the result, as large as possible whilst still looking elegant, inside a plain white box with a black outline. center this horizontally and vertically on a plain white background".to_string(),
            _ => "turn the face from the attached photo into a line drawing suitable for a coloring page, ensuring accurate facial features are maintained. place the result, as large as possible whilst still looking elegant, inside a plain white box with a black outline. center this collection of objects horizontally and vertically on top of an abstract pattern suitable for mindful coloring".to_string(),
        },
        (true, true) => format!(
            "turn the faces from the attached {} photos into line drawings suitable for a coloring page, ensuring accurate facial features are maintained. place each result inside its own plain white box with a black outline.{} arrange all boxes elegantly and write {} in friendly white letters with black outline somewhere unobtrusive {}",
            num_photos, names_desc, name_or_message, backdrop
        ),
        (true, false) => format!(
            "turn the face from the attached photo into a line drawing suitable for a coloring page, ensuring accurate facial features are maintained. place the result, as large as possible whilst still looking elegant, inside a plain white box with a black outline. below this box write {} in friendly white letters with black outline, suited to a coloring page. center this collection of objects horizontally and vertically {}",
            name_or_message, backdrop
        ),
    }
}

/// Per-photo figure list for the multi-photo cartoon portrait: labelled
/// photos get an "engaged in" clause, unlabelled ones are listed bare.
fn figures_clause(individual_labels: &[String]) -> String {
    individual_labels
        .iter()
        .enumerate()
        .map(|(idx, activity)| {
            if activity.trim().is_empty() {
                format!("the figure from photo {}", idx + 1)
            } else {
                format!("the figure from photo {} engaged in {}", idx + 1, activity)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn cartoon_portrait_prompt(
    has_name: bool,
    has_activity: bool,
    name_or_message: &str,
    individual_labels: &[String],
    background: &str,
    scene_description: Option<&str>,
) -> String {
    let num_photos = individual_labels.len();
    let multiple = num_photos > 1;

    let activities_desc = if multiple
        && individual_labels
            .iter()
            .any(|label| !label.trim().is_empty())
    {
        figures_clause(individual_labels)
    } else if !multiple && has_activity {
        individual_labels.first().cloned().unwrap_or_default()
    } else {
        String::new()
    };

    let scene = scene_description.filter(|scene| !scene.is_empty());

    if background == "scene" {
        let Some(scene) = scene else {
            return FALLBACK_PROMPT.to_string();
        };
        return if multiple {
            if activities_desc.is_empty() {
                format!(
                    "turn the faces from the attached {} photos into line drawings suitable for a coloring page, ensuring accurate facial features are maintained. place each result onto a cartoon style line drawing body in the same coloring page style. show all entire figures arranged in a way that makes sense in a {} background",
                    num_photos, scene
                )
            } else {
                format!(
                    "turn the faces from the attached {} photos into line drawings suitable for a coloring page, ensuring accurate facial features are maintained. place each result onto a cartoon style line drawing body in the same coloring page style, with {}. show all entire figures arranged in a way that makes sense in a {} background",
                    num_photos, activities_desc, scene
                )
            }
        } else {
            format!(
                "turn the face from the attached photo into a line drawing suitable for a coloring page, ensuring accurate facial features are maintained. place the result onto a cartoon style line drawing body in the same coloring page style engaged in {}. show the entire figure. place the result in a way that makes sense in a {} background",
                activities_desc, scene
            )
        };
    }

    let backdrop = match background {
        "plain" => "on a plain white background",
        "mindful-pattern" => "on top of an abstract pattern suitable for mindful coloring",
        _ => return FALLBACK_PROMPT.to_string(),
    };

    if multiple {
        match (has_name, activities_desc.is_empty()) {
            (false, false) => format!(
                "turn the faces from the attached {} photos into line drawings suitable for a coloring page, ensuring accurate facial features are maintained. place each result onto a cartoon style line drawing body in the same coloring page style, with {}. show all entire figures. arrange them elegantly {}",
                num_photos, activities_desc, backdrop
            ),
            (true, false) => format!(
                "turn the faces from the attached {} photos into line drawings suitable for a coloring page, ensuring accurate facial features are maintained. place each result onto a cartoon style line drawing body in the same coloring page style, with {}. show all entire figures. write {} in friendly white letters with black outline somewhere unobtrusive. arrange everything elegantly {}",
                num_photos, activities_desc, name_or_message, backdrop
            ),
            (false, true) => format!(
                "turn the faces from the attached {} photos into line drawings suitable for a coloring page, ensuring accurate facial features are maintained. place each result onto a cartoon style line drawing body in the same coloring page style. show all entire figures. arrange them elegantly {}",
                num_photos, backdrop
            ),
            (true, true) => format!(
                "turn the faces from the attached {} photos into line drawings suitable for a coloring page, ensuring accurate facial features are maintained. place each result onto a cartoon style line drawing body in the same coloring page style. show all entire figures. write {} in friendly white letters with black outline somewhere unobtrusive. arrange everything elegantly {}",
                num_photos, name_or_message, backdrop
            ),
        }
    } else {
        match (has_name, has_activity) {
            (false, false) => format!(
                "turn the face from the attached photo into a line drawing suitable for a coloring page, ensuring accurate facial features are maintained. place the result onto a cartoon style line drawing body in the same coloring page style. {} {}",
                single_cartoon_plain_tail(background),
                backdrop
            ),
            (true, false) => format!(
                "turn the face from the attached photo into a line drawing suitable for a coloring page, ensuring accurate facial features are maintained. place the result onto a cartoon style line drawing body in the same coloring page style. {} below this write {} in friendly white letters with black outline, suited to a coloring page. finally place this collection of objects as large as possible whilst still looking elegant, centered horizontally and vertically {}",
                single_cartoon_body_tail(background),
                name_or_message,
                backdrop
            ),
            (false, true) => format!(
                "turn the face from the attached photo into a line drawing suitable for a coloring page, ensuring accurate facial features are maintained. place the result onto a cartoon style line drawing body in the same coloring page style engaged in {}. show the entire figure. place this result as large as possible whilst still looking elegant, centered horizontally and vertically {}",
                activities_desc, backdrop
            ),
            (true, true) => format!(
                "turn the face from the attached photo into a line drawing suitable for a coloring page, ensuring accurate facial features are maintained. place the result onto a cartoon style line drawing body in the same coloring page style engaged in {}. show the entire figure. below this write {} in friendly white letters with black outline, suited to a coloring page. finally place this collection of objects as large as possible whilst still looking elegant, centered horizontally and vertically {}",
                activities_desc, name_or_message, backdrop
            ),
        }
    }
}

// The original wording drifts between the plain and pattern variants for the
// single-photo cartoon without activity; these tails preserve that drift.
fn single_cartoon_plain_tail(background: &str) -> &'static str {
    if background == "plain" {
        "place this result as large as possible whilst still showing the entire figure, centered horizontally and vertically"
    } else {
        "show the entire figure. place this result as large as possible whilst still looking elegant, centered horizontally and vertically"
    }
}

fn single_cartoon_body_tail(background: &str) -> &'static str {
    if background == "plain" {
        "show the entire body."
    } else {
        "show the entire figure."
    }
}
