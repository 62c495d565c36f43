use base64::{engine::general_purpose, Engine as _};
use pulldown_cmark::{html, CowStr, Event};

use crate::storybook::assembler::Storybook;

const GALLERY_STYLE: &str = r#"<style>
  body { margin: 0; font-family: "Trebuchet MS", sans-serif; background: #fdf6ec; }
  .container { max-width: 2400px; margin: 30px auto; padding: 0 20px; }
  .title { text-align: center; font-size: 36px; font-weight: bold; margin-bottom: 40px;
           background: linear-gradient(135deg, #667eea, #764ba2); -webkit-background-clip: text;
           -webkit-text-fill-color: transparent; }
  .grid { display: grid; grid-template-columns: repeat(4, 1fr); gap: 20px; }
  .card { position: relative; border-radius: 12px; overflow: hidden;
          box-shadow: 0 8px 25px rgba(0,0,0,0.12); background: #fff; }
  .card img { width: 100%; height: auto; display: block; }
  .caption { position: absolute; bottom: 0; left: 0; right: 0; padding: 12px 16px 28px;
             color: #fff; font-weight: 800; font-size: 16px; line-height: 1.3;
             text-shadow: -2px -2px 0 rgba(0,0,0,0.8), 2px -2px 0 rgba(0,0,0,0.8),
                          -2px 2px 0 rgba(0,0,0,0.8), 2px 2px 0 rgba(0,0,0,0.8); }
  .caption p { margin: 0; }
  .counter { position: absolute; bottom: 8px; right: 12px; font-size: 14px; font-weight: 900;
             color: #e6f5ff;
             text-shadow: -1px -1px 0 rgba(0,0,0,0.9), 1px -1px 0 rgba(0,0,0,0.9),
                          -1px 1px 0 rgba(0,0,0,0.9), 1px 1px 0 rgba(0,0,0,0.9); }
  @media (max-width: 1600px) { .grid { grid-template-columns: repeat(3, 1fr); } .caption { font-size: 15px; } }
  @media (max-width: 1200px) { .grid { grid-template-columns: repeat(2, 1fr); } .caption { font-size: 14px; } }
  @media (max-width: 700px)  { .grid { grid-template-columns: 1fr; } .caption { font-size: 13px; } }
</style>"#;

fn escape_text(text: &str) -> String {
    let mut out = String::new();
    html::push_html(&mut out, std::iter::once(Event::Text(CowStr::from(text))));
    out
}

/// Scene text as one plain paragraph; list markers, emphasis and raw HTML
/// are shown literally.
fn render_caption(caption: &str) -> String {
    format!("<p>{}</p>\n", escape_text(caption.trim()))
}

/// Self-contained HTML page: one card per scene with its embedded PNG, the
/// caption and an `i/N` counter.
pub fn render_gallery_html(title: &str, captions: &[String], images: &[Vec<u8>]) -> String {
    let total = captions.len().min(images.len());
    let mut cards = String::new();
    for (position, (caption, png)) in captions.iter().zip(images).enumerate() {
        cards.push_str(&format!(
            "    <div class=\"card\">\n      <img src=\"data:image/png;base64,{}\" alt=\"Scene {}\">\n      <div class=\"caption\">\n        {}        <div class=\"counter\">{}/{}</div>\n      </div>\n    </div>\n",
            general_purpose::STANDARD.encode(png),
            position + 1,
            render_caption(caption),
            position + 1,
            total
        ));
    }

    let title = escape_text(title);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n{GALLERY_STYLE}\n</head>\n<body>\n<div class=\"container\">\n  <div class=\"title\">{title}</div>\n  <div class=\"grid\">\n{cards}  </div>\n</div>\n</body>\n</html>\n"
    )
}

pub fn render_gallery(storybook: &Storybook) -> String {
    let images: Vec<Vec<u8>> = storybook
        .pages
        .iter()
        .map(|page| page.illustration.png.clone())
        .collect();
    render_gallery_html(&storybook.display_title(), &storybook.scene_texts(), &images)
}
