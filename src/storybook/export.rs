use std::io::Cursor;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, ImageFormat};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, Str};
use tokio::{fs, task};
use tracing::info;

use crate::storybook::store::ExportContent;

// A4 in points.
const PAGE_WIDTH: f32 = 595.276;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 36.0;
const TITLE_SIZE: f32 = 18.0;
const CAPTION_SIZE: f32 = 11.0;
const CAPTION_LEADING: f32 = 14.0;
const IMAGE_MAX_HEIGHT_RATIO: f32 = 0.60;

const REGULAR_FONT: Name<'static> = Name(b"F1");
const BOLD_FONT: Name<'static> = Name(b"F2");
const PAGE_IMAGE: Name<'static> = Name(b"Im1");

/// `<name>_christmas_storybook.pdf`, with anything outside `[A-Za-z0-9_-]`
/// replaced by `_`.
pub fn pdf_file_name(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = if stem.is_empty() { "storybook".to_string() } else { stem };
    format!("{stem}_christmas_storybook.pdf")
}

/// Reads the illustrations named by `content` and writes the PDF storybook to
/// `pdf_path`.
pub async fn export_storybook_pdf(content: &ExportContent<'_>, pdf_path: &Path) -> Result<()> {
    let mut images = Vec::with_capacity(content.image_paths.len());
    for path in content.image_paths {
        let bytes = fs::read(path)
            .await
            .with_context(|| format!("Failed to read illustration {path}"))?;
        images.push(bytes);
    }

    let title = content.title.clone();
    let scenes = content.scenes.to_vec();
    let pdf = task::spawn_blocking(move || render_storybook_pdf(&title, &scenes, &images))
        .await
        .map_err(|err| anyhow!("PDF rendering task failed: {err}"))??;

    fs::write(pdf_path, &pdf)
        .await
        .with_context(|| format!("Failed to write PDF {}", pdf_path.display()))?;
    info!("PDF storybook written to {} ({} bytes)", pdf_path.display(), pdf.len());
    Ok(())
}

/// One A4 page per scene: `title (i/N)` header, the illustration scaled to
/// fit, then the caption wrapped to the text width.
pub fn render_storybook_pdf(title: &str, scenes: &[String], images: &[Vec<u8>]) -> Result<Vec<u8>> {
    let total = scenes.len().min(images.len());
    if total == 0 {
        return Err(anyhow!("Nothing to export: storybook has no illustrated scenes"));
    }

    let catalog_id = Ref::new(1);
    let page_tree_id = Ref::new(2);
    let regular_font_id = Ref::new(3);
    let bold_font_id = Ref::new(4);
    let mut next_id = 5;
    let mut alloc = || {
        let id = Ref::new(next_id);
        next_id += 1;
        id
    };

    let mut pdf = Pdf::new();
    pdf.type1_font(regular_font_id)
        .base_font(Name(b"Helvetica"))
        .encoding_predefined(Name(b"WinAnsiEncoding"));
    pdf.type1_font(bold_font_id)
        .base_font(Name(b"Helvetica-Bold"))
        .encoding_predefined(Name(b"WinAnsiEncoding"));

    let mut page_ids = Vec::with_capacity(total);
    for (position, (scene, raw)) in scenes.iter().zip(images).take(total).enumerate() {
        let page_id = alloc();
        let content_id = alloc();
        let image_id = alloc();
        page_ids.push(page_id);

        let (jpeg, image_width, image_height) = to_jpeg(raw)
            .with_context(|| format!("Illustration {} could not be prepared", position + 1))?;
        let mut image = pdf.image_xobject(image_id, &jpeg);
        image.filter(Filter::DctDecode);
        image.width(image_width as i32);
        image.height(image_height as i32);
        image.color_space().device_rgb();
        image.bits_per_component(8);
        image.finish();

        let content = page_content(
            &format!("{}  ({}/{})", title, position + 1, total),
            scene,
            image_width as f32,
            image_height as f32,
        );
        pdf.stream(content_id, &content);

        let mut page = pdf.page(page_id);
        page.media_box(Rect::new(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT));
        page.parent(page_tree_id);
        page.contents(content_id);
        let mut resources = page.resources();
        resources
            .fonts()
            .pair(REGULAR_FONT, regular_font_id)
            .pair(BOLD_FONT, bold_font_id);
        resources.x_objects().pair(PAGE_IMAGE, image_id);
        resources.finish();
        page.finish();
    }

    pdf.pages(page_tree_id)
        .kids(page_ids.iter().copied())
        .count(page_ids.len() as i32);
    pdf.catalog(catalog_id).pages(page_tree_id);
    Ok(pdf.finish())
}

fn page_content(header: &str, caption: &str, image_width: f32, image_height: f32) -> Vec<u8> {
    let mut content = Content::new();

    content.begin_text();
    content.set_font(BOLD_FONT, TITLE_SIZE);
    content.next_line(MARGIN, PAGE_HEIGHT - MARGIN);
    content.show(Str(&win_ansi(header)));
    content.end_text();

    let max_width = PAGE_WIDTH - 2.0 * MARGIN;
    let max_height = PAGE_HEIGHT * IMAGE_MAX_HEIGHT_RATIO;
    let scale = (max_width / image_width).min(max_height / image_height);
    let (draw_width, draw_height) = (image_width * scale, image_height * scale);
    let x = (PAGE_WIDTH - draw_width) / 2.0;
    let y = PAGE_HEIGHT - MARGIN - 40.0 - draw_height;

    content.save_state();
    content.transform([draw_width, 0.0, 0.0, draw_height, x, y]);
    content.x_object(PAGE_IMAGE);
    content.restore_state();

    let lines = wrap_caption(caption, max_width, CAPTION_SIZE);
    if !lines.is_empty() {
        content.begin_text();
        content.set_font(REGULAR_FONT, CAPTION_SIZE);
        content.next_line(MARGIN, y - 20.0);
        for (index, line) in lines.iter().enumerate() {
            if index > 0 {
                content.next_line(0.0, -CAPTION_LEADING);
            }
            content.show(Str(&win_ansi(line)));
        }
        content.end_text();
    }

    content.finish().to_vec()
}

fn to_jpeg(raw: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let rgb = image::load_from_memory(raw)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut jpeg = Vec::new();
    DynamicImage::ImageRgb8(rgb).write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;
    Ok((jpeg, width, height))
}

/// Greedy word wrap against Helvetica advance widths.
fn wrap_caption(text: &str, max_width: f32, font_size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{line} {word}")
        };
        if line.is_empty() || text_width(&candidate, font_size) <= max_width {
            line = candidate;
        } else {
            lines.push(std::mem::replace(&mut line, word.to_string()));
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

fn text_width(text: &str, font_size: f32) -> f32 {
    let units: u32 = text.chars().map(helvetica_advance).sum();
    units as f32 * font_size / 1000.0
}

fn helvetica_advance(c: char) -> u32 {
    const ASCII: [u16; 95] = [
        278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
        556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
        1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
        667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
        333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
        556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
    ];
    match c as u32 {
        code @ 0x20..=0x7e => u32::from(ASCII[(code - 0x20) as usize]),
        _ => 556,
    }
}

/// Standard 14 fonts only cover WinAnsi; typographic punctuation is mapped to
/// its WinAnsi code and anything else outside Latin-1 becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2026}' => 0x85,
            c if (c as u32) < 0x80 || (0xa0..=0xff).contains(&(c as u32)) => c as u8,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 120, 40])))
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|window| *window == needle).count()
    }

    #[test]
    fn one_page_per_illustrated_scene() {
        let scenes = vec![
            "Snow fell on the village.".to_string(),
            "Mia found a bell.".to_string(),
            "No picture for this one.".to_string(),
        ];
        let pdf = render_storybook_pdf(
            "Mia's AI Christmas Storybook",
            &scenes,
            &[png(576, 768), png(576, 768)],
        )
        .unwrap();

        assert!(pdf.starts_with(b"%PDF-"));
        assert_eq!(count(&pdf, b"/MediaBox"), 2);
        assert_eq!(count(&pdf, b"/DCTDecode"), 2);
        assert_eq!(count(&pdf, b"(Mia's AI Christmas Storybook  \\(1/2\\))"), 1);
        assert_eq!(count(&pdf, b"\\(2/2\\)"), 1);
        assert_eq!(count(&pdf, b"No picture"), 0);
    }

    #[test]
    fn unreadable_illustration_is_an_error() {
        let err = render_storybook_pdf("t", &["one".to_string()], &[vec![1, 2, 3]]).unwrap_err();
        assert!(err.to_string().contains("Illustration 1 could not be prepared"));
        assert!(render_storybook_pdf("t", &[], &[]).is_err());
    }

    #[test]
    fn wraps_captions_to_the_text_width() {
        let caption = "Mia and her little brother walked all the way up the snowy hill to watch the lights of the village twinkle below them";
        let lines = wrap_caption(caption, 200.0, CAPTION_SIZE);

        assert!(lines.len() > 1);
        assert_eq!(lines.join(" "), caption);
        for line in &lines {
            assert!(text_width(line, CAPTION_SIZE) <= 200.0, "{line}");
        }
        assert_eq!(wrap_caption("   ", 200.0, CAPTION_SIZE), Vec::<String>::new());
    }

    #[test]
    fn oversized_word_gets_its_own_line() {
        let lines = wrap_caption("a Supercalifragilisticexpialidocious b", 50.0, CAPTION_SIZE);
        assert_eq!(lines, vec!["a", "Supercalifragilisticexpialidocious", "b"]);
    }

    #[test]
    fn maps_text_to_win_ansi() {
        assert_eq!(win_ansi("Zoë’s “tree”…"), b"Zo\xeb\x92s \x93tree\x94\x85".to_vec());
        assert_eq!(win_ansi("雪"), b"?".to_vec());
    }

    #[test]
    fn pdf_file_name_is_filesystem_safe() {
        assert_eq!(pdf_file_name("Mia"), "Mia_christmas_storybook.pdf");
        assert_eq!(pdf_file_name("Anna Lee"), "Anna_Lee_christmas_storybook.pdf");
        assert_eq!(pdf_file_name("../x"), "___x_christmas_storybook.pdf");
        assert_eq!(pdf_file_name("  "), "storybook_christmas_storybook.pdf");
    }
}
