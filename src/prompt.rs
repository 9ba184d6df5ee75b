//! Prompt templates for test case generation.
//!
//! The system template carries the instructions, a worked example, and the
//! output format that [`crate::cases`] parses. It has three placeholders:
//! `{context}` (retrieved SRS excerpts), `{question}` (the user story), and
//! `{num_test_cases}` (how many cases to ask for).

use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::models::ScoredChunk;

pub const CONTEXT_SLOT: &str = "{context}";
pub const QUESTION_SLOT: &str = "{question}";
pub const COUNT_SLOT: &str = "{num_test_cases}";

const DEFAULT_TEMPLATE: &str = r#"Use the following excerpts of the Software Requirements Specification (SRS) as context:
{context}

User story:
{question}

Generate {num_test_cases} test cases in proper format with their codes based on the user's input user story and the associated Software Requirements Specification (SRS) file. Your goal is to ensure that the test scenarios are covered.
Please follow the format below when generating test cases:

Example User Story:
As an online shopper, I want to be able to add products to my shopping cart, review the cart, and proceed to checkout to make a purchase.

Acceptance Criteria:
The e-commerce website is accessible.
The website displays a catalog of products.
Users can select products to add to their shopping cart.
Users can view the contents of their shopping cart.
Users can proceed to the checkout process to complete a purchase.

Example Test Case:

Test Case 1: Adding a Product to the Cart

ID: TC-ECOM-001

Priority: High

Preconditions:
The e-commerce website is accessible.
There are products available in the catalog.

Test Steps:
1. Open the web browser.
2. Navigate to the e-commerce website.
3. Browse the product catalog and select a product.
4. Click the "Add to Cart" or "Buy Now" button for the selected product.

Expected Result:
- The selected product should be added to the shopping cart.
- The user should see a confirmation message indicating that the product has been added.

Postconditions:
The selected product is added to the user's shopping cart.

Test Data:
User is logged in as: user@example.com

Test Environment:
- Web browser (latest version)
- E-commerce website product catalog page

Test Execution:
- Execute the test steps as described.
- Verify that the selected product is added to the shopping cart.
- Check that the user sees a confirmation message indicating successful addition.

Pass Criteria:
- The product is successfully added to the shopping cart.
- The user receives a confirmation message.

Fail Criteria:
- The product is not added to the shopping cart.
- An error message is displayed indicating the addition was unsuccessful.

Selenium Code (Python):
```python
from selenium import webdriver
from selenium.webdriver.common.by import By
from webdriver_manager.chrome import ChromeDriverManager
from selenium.webdriver.chrome.service import Service

driver = webdriver.Chrome(service=Service(ChromeDriverManager().install()))
driver.get("https://shop.example.com")
driver.find_element(by=By.XPATH, value="//a[@class='product'][1]").click()
driver.find_element(by=By.XPATH, value="//button[text()='Add to Cart']").click()
assert "added to your cart" in driver.page_source
driver.quit()
```

Now, using the provided user story and any relevant information from the SRS context, generate {num_test_cases} test cases in the format described above. Ensure that each test case is clear, specific, and covers a different scenario related to the user story.
Start every test case with the heading "Test Case <number>:" and follow its description with the heading "Selenium Code (Python):" and a single ```python fenced code block implementing its test steps.
find_element_by_xpath is deprecated. Use find_element(by=By.XPATH, value=xpath) instead.
Automatically determine the path to the WebDriver executable and support multiple browsers (chrome, firefox, and microsoft edge) using the webdriver_manager package in Python.
"#;

const CONDENSE_TEMPLATE: &str = r#"Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:"#;

/// How many test cases to ask the oracle for. Only 1 through 5 are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationCount(u8);

impl GenerationCount {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for GenerationCount {
    type Error = PipelineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(PipelineError::InvalidCount(value))
        }
    }
}

/// A validated system prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    text: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Wraps a custom template, rejecting ones that cannot carry the
    /// retrieved context or the user story.
    pub fn new(text: impl Into<String>) -> PipelineResult<Self> {
        let text = text.into();
        for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
            if !text.contains(slot) {
                return Err(PipelineError::Template(format!(
                    "template must contain the {} placeholder",
                    slot
                )));
            }
        }
        Ok(Self { text })
    }

    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Template(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::new(text)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Substitutes all placeholders in one pass, so placeholder-like text
    /// inside the SRS or the story is left alone.
    pub fn render(
        &self,
        context: &[ScoredChunk],
        question: &str,
        count: Option<GenerationCount>,
    ) -> String {
        let context_text = context
            .iter()
            .map(|hit| hit.chunk.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n");
        let count_text = match count {
            Some(n) => n.get().to_string(),
            None => "all possible".to_string(),
        };
        substitute(
            &self.text,
            &[
                (CONTEXT_SLOT, context_text.as_str()),
                (QUESTION_SLOT, question),
                (COUNT_SLOT, count_text.as_str()),
            ],
        )
    }
}

/// Prompt asking the oracle to fold history into a standalone question.
pub fn condense_prompt(history: &[(String, String)], question: &str) -> String {
    let transcript = history
        .iter()
        .map(|(q, a)| format!("Human: {}\nAssistant: {}", q, a))
        .collect::<Vec<_>>()
        .join("\n");
    substitute(
        CONDENSE_TEMPLATE,
        &[("{chat_history}", transcript.as_str()), (QUESTION_SLOT, question)],
    )
}

fn substitute(template: &str, slots: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    'scan: while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        for (slot, value) in slots {
            if tail.starts_with(slot) {
                out.push_str(value);
                rest = &tail[slot.len()..];
                continue 'scan;
            }
        }
        out.push('{');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}
