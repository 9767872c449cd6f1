/// Goal-conditioned extraction prompt; asks for a JSON object with
/// `rational`, `evidence` and `summary`.
pub fn render_prompt(webpage_content: &str, goal: &str) -> String {
    format!(
        r#"Please process the following webpage content and user goal to extract relevant information:

## **Webpage Content**
{webpage_content}

## **User Goal**
{goal}

## **Task Guidelines**
1. **Content Scanning for Rational**: Locate the **specific sections/data** directly related to the user's goal within the webpage content.
2. **Key Extraction for Evidence**: Identify and extract the **most relevant information** from the content. Never miss any important information; output the **full original context** of the content as far as possible, it can be more than three paragraphs.
3. **Summary Output for Summary**: Organize into a concise paragraph with logical flow, prioritizing clarity, and judge the contribution of the information to the goal.

**Final Output Format: a JSON object with "rational", "evidence" and "summary" fields.**
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_content_and_goal() {
        let p = render_prompt("PAGE_BODY", "find the CEO");
        assert!(p.contains("## **Webpage Content**\nPAGE_BODY\n"));
        assert!(p.contains("## **User Goal**\nfind the CEO\n"));
        assert!(p.contains("\"evidence\""));
    }
}
