//! Render a failed edit into the retry instruction sent back to the model.

use crate::types::RetryContext;

/// Natural-language feedback for one failed attempt. The context is consumed
/// so it cannot be reused for a second prompt.
pub(crate) fn render_retry_prompt(ctx: RetryContext) -> String {
    let RetryContext {
        path,
        failed_lines,
        file_content,
        reason,
        ..
    } = ctx;

    let mut prompt = format!("The edit to `{path}` could not be applied: {reason}\n");
    if !failed_lines.is_empty() {
        prompt.push_str(&format!(
            "\nThe lines you asked to locate were:\n{failed_lines}\n"
        ));
    }
    if !file_content.is_empty() {
        prompt.push_str(&format!(
            "\nHere is the current content of `{path}`:\n{file_content}\n"
        ));
    }
    prompt.push_str(
        "\nResend the complete edit for this file in the same format, copying the lines to \
         search for exactly as they appear in the file above.",
    );
    prompt
}
