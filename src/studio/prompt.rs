//! Prompt templates sent to the image model.

/// Wraps the user's topic in the cover design brief.
pub fn cover_prompt(topic: &str, has_reference: bool) -> String {
    let mut prompt = format!(
        "Professional high-quality cover design. Topic: {}. \
         Style: High-end graphic design, professional photography, clean composition, \
         vibrant colors, 4k resolution.",
        topic.trim()
    );
    if has_reference {
        prompt.push_str(
            " Use the attached image as a visual reference for composition, style, \
             or color palette, but adapt it to the requested topic.",
        );
    }
    prompt
}

/// Builds the instruction for editing an existing cover.
pub fn edit_prompt(instruction: &str) -> String {
    format!(
        "Edit this image precisely based on this instruction: \"{}\". \
         Maintain the exact same composition, lighting, and style of the original image. \
         Only modify the specific elements mentioned in the instruction.",
        instruction.trim()
    )
}

/// Records an applied refinement after the prompt that produced the image.
pub fn refined_source_prompt(original: &str, instruction: &str) -> String {
    format!("{} (Adjusted: {})", original, instruction.trim())
}
