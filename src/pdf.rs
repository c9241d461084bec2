use crate::contract::AnalysisResult;
use crate::error::ExportError;
use printpdf::*;
use std::io::BufWriter;

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const TOP: f32 = 275.0;
const BOTTOM: f32 = 20.0;
const LEFT: f32 = 15.0;
const WRAP_CHARS: usize = 95;

struct Cursor {
    layer: PdfLayerReference,
    y: f32,
}

/// Text-only analysis report. Long sections wrap and flow onto new pages.
pub fn generate_pdf(title: &str, analysis: &AnalysisResult) -> Result<Vec<u8>, ExportError> {
    let (doc, page, layer) = PdfDocument::new(
        format!("EcoAssess: {}", truncate(title, 48)),
        Mm(PAGE_W),
        Mm(PAGE_H),
        "Layer 1",
    );
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(|e| ExportError::Pdf(format!("{e:?}")))?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(|e| ExportError::Pdf(format!("{e:?}")))?;

    let mut cursor = Cursor { layer: doc.get_page(page).get_layer(layer), y: TOP };
    let line = |cursor: &mut Cursor, text: &str, size: f32, font: &IndirectFontRef| {
        if cursor.y < BOTTOM {
            let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Continued");
            cursor.layer = doc.get_page(page).get_layer(layer);
            cursor.y = TOP;
        }
        cursor.layer.use_text(text, size, Mm(LEFT), Mm(cursor.y), font);
        cursor.y -= size * 0.5 + 2.0;
    };

    line(&mut cursor, "Product Sustainability Report", 20.0, &bold);
    line(&mut cursor, &truncate(title, 140), 11.0, &font);
    line(
        &mut cursor,
        &format!("Overall Sustainability Score: {}/100", analysis.overall_sustainability_score),
        14.0,
        &bold,
    );

    let section = |cursor: &mut Cursor, heading: &str, body: &str| {
        cursor.y -= 4.0;
        line(cursor, heading, 13.0, &bold);
        for wrapped in wrap(body, WRAP_CHARS) {
            line(cursor, &wrapped, 10.0, &font);
        }
    };

    section(&mut cursor, "Summary", &analysis.environmental_impact_analysis);
    section(&mut cursor, "Key Factors", &analysis.key_factors);
    if let Some(guess) = &analysis.product_identification_guess {
        section(&mut cursor, "Product Identification (Image)", guess);
    }
    for (name, category) in analysis.detailed_analysis.categories() {
        section(
            &mut cursor,
            &format!("{} (impact: {})", name.label(), category.impact_level),
            &category.analysis,
        );
    }
    if let Some(ia) = &analysis.detailed_analysis.ingredient_analysis {
        section(
            &mut cursor,
            &format!("Ingredients (impact: {})", ia.ingredient_impact_level),
            &ia.overall_ingredient_summary,
        );
        for ing in &ia.identified_ingredients {
            section(
                &mut cursor,
                &format!("{} - {}", ing.name, ing.assessment.as_str()),
                ing.health_hazards.as_deref().unwrap_or("No known health hazards noted."),
            );
        }
    }
    drop(cursor);

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = BufWriter::new(&mut buf);
        doc.save(&mut writer).map_err(|e| ExportError::Pdf(format!("{e:?}")))?;
    }
    Ok(buf)
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if !current.is_empty() && current.chars().count() + word.chars().count() + 1 > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap("one two three four five", 9);
        assert_eq!(lines, vec!["one two", "three", "four five"]);
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("ééé", 2), "éé…");
        assert_eq!(truncate("short", 10), "short");
    }
}
