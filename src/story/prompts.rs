use crate::config::{
    MAX_CHARACTER_WORDS, MAX_PROMPT_WORDS, MAX_SCENES, MAX_WORDS, MIN_SCENES, SCENE_BREAK,
};

fn section(title: &str, body: &str) -> String {
    format!("{}\n{}", title, body)
}

pub fn build_character_prompt(name: &str, age: u32, keywords: &str) -> String {
    let sections = vec![
        "You are creating a highly detailed visual description of a recurring character \
         for a cozy, warm Christmas storybook, optimized for Stable Diffusion prompts."
            .to_string(),
        section(
            "Given:",
            &format!(
                "- Name: {name}\n- Exact numeric age: {age} years old\n- Themes/keywords: {keywords}"
            ),
        ),
        format!(
            "TASK:\nDescribe ONLY how the character LOOKS, as if you were giving instructions to an illustrator.\n\
             The character's apparent age MUST CLEARLY match a {age}-year-old human, in both face and body proportions."
        ),
        section(
            "HARD CONSTRAINTS:",
            &format!(
                "- ONE sentence, maximum {MAX_CHARACTER_WORDS} words.\n\
                 - Third person only (no \"I\" or \"you\").\n\
                 - The character must clearly look like a {age}-year-old (no baby, no teenager, no adult if {age} is a child).\n\
                 - Do NOT contradict the given age visually (no adult height or facial structure for a child).\n\
                 - Include, in this order if possible:\n \
                 1) apparent age range and body type,\n \
                 2) skin tone and face details (eye color, hair color, hairstyle),\n \
                 3) distinctive facial features (freckles, glasses, beard, dimples, etc.),\n \
                 4) upper body clothing (type, color, winter style),\n \
                 5) lower body clothing (pants/skirt, color),\n \
                 6) shoes/boots (type, color),\n \
                 7) 1-2 small accessories (scarf, hat, gloves, bag)."
            ),
        ),
        section(
            "STYLE REQUIREMENTS:",
            "- Warm, friendly, winter/Christmas outfit (scarves, hats, sweaters, coats, etc.).\n\
             - No background, no actions, no personality, no props other than clothing/accessories.\n\
             - Do NOT mention camera, lighting, art style, or environment (those come from another prompt).\n\
             - Do NOT explicitly mention the name or the numeric age in the sentence.",
        ),
        "Output ONLY the final description sentence, nothing else.".to_string(),
    ];
    sections.join("\n\n")
}

pub fn build_story_prompt(name: &str, age: u32, keywords: &str) -> String {
    let sections = vec![
        "You are writing a story split into scenes.".to_string(),
        section(
            "TASK:",
            &format!("Write a Christmas story for {name}, age {age}.\nThemes: {keywords}"),
        ),
        section(
            "HARD CONSTRAINTS (ALL MUST BE RESPECTED):",
            &format!(
                "- Total length: at most {MAX_WORDS} words.\n\
                 - Write BETWEEN {MIN_SCENES} and {MAX_SCENES} scenes.\n\
                 - EACH SCENE MUST BE 1-2 short sentences.\n\
                 - AFTER EACH SCENE, WRITE THE TOKEN: {SCENE_BREAK}\n\
                 - Do NOT number the scenes.\n\
                 - Do NOT add titles.\n\
                 - Do NOT repeat the entire story inside a single scene.\n\
                 - Output ONLY the scenes with {SCENE_BREAK} separators."
            ),
        ),
    ];
    sections.join("\n\n")
}

/// `correction` is appended on the retry after a consistency check failed.
pub fn build_illustration_prompt(
    scene_text: &str,
    character_description: &str,
    style_block: &str,
    correction: Option<&str>,
) -> String {
    let mut sections = vec![
        "Create ONE Stable Diffusion prompt.".to_string(),
        section("Scene:", &format!("\"\"\"{scene_text}\"\"\"")),
        section(
            "Character constraints (MUST be fully and explicitly included in the final prompt, without changing them):",
            character_description,
        ),
        section(
            "Style (MUST be included exactly as is, without removing parts):",
            style_block,
        ),
        section(
            "Hard rules:",
            &format!(
                "- Warm golden/amber/orange tones (NO cold colors, NO blues, NO grays).\n\
                 - The prompt MUST explicitly restate the full character description above, unchanged.\n\
                 - Soft lighting: fireplace, candlelight, warm glow, gentle shadows.\n\
                 - 2D illustration storybook style, watercolor, ink outline, flat colors.\n\
                 - Hygge, comfortable, peaceful atmosphere.\n\
                 - NO photorealistic, NO photograph.\n\
                 - No text/letters/logos.\n\
                 - Under {MAX_PROMPT_WORDS} words."
            ),
        ),
    ];
    if let Some(correction) = correction {
        sections.push(section("Correction:", correction));
    }
    sections.push("Output ONLY the prompt.".to_string());
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn story_prompt_names_marker_and_bounds() {
        let prompt = build_story_prompt("Mia", 6, "snow, reindeer");
        assert!(prompt.contains("Write a Christmas story for Mia, age 6."));
        assert!(prompt.contains("Themes: snow, reindeer"));
        assert!(prompt.contains("BETWEEN 10 and 15 scenes"));
        assert!(prompt.contains("at most 200 words"));
        assert!(prompt.contains("WRITE THE TOKEN: [SCENE_BREAK]"));
    }

    #[test]
    fn character_prompt_carries_age_constraints() {
        let prompt = build_character_prompt("Mia", 6, "snow");
        assert!(prompt.contains("Exact numeric age: 6 years old"));
        assert!(prompt.contains("maximum 45 words"));
        assert!(prompt.contains("Do NOT explicitly mention the name or the numeric age"));
    }

    #[test]
    fn illustration_prompt_embeds_blocks_and_optional_correction() {
        let prompt = build_illustration_prompt("Mia skates.", "A small girl.", "watercolor", None);
        assert!(prompt.contains("Scene:\n\"\"\"Mia skates.\"\"\""));
        assert!(prompt.contains("A small girl."));
        assert!(prompt.contains("watercolor"));
        assert!(prompt.contains("Under 70 words."));
        assert!(!prompt.contains("Correction:"));

        let retry = build_illustration_prompt("Mia skates.", "A small girl.", "watercolor", Some("Keep it."));
        assert!(retry.contains("Correction:\nKeep it."));
        assert!(retry.ends_with("Output ONLY the prompt."));
    }
}
