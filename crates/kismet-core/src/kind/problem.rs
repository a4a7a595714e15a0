use std::collections::HashMap;
use std::path::PathBuf;

use super::{push_input, push_request, ContentKind};
use crate::error::{KismetError, Result};
use crate::model::{GenerationResult, ProblemFilters, SavedProblem, Segment, SegmentId};
use crate::parse::{extract_problem_title, IdSource, SequentialIds};

const PROBLEM_PROMPT: &str = "\
You are an expert in Data Structures and Algorithms (DSA) and a proficient programmer. \
Act as a DSA problem generator.

Objective: provide a single, random, popular DSA question with its optimal solution.

Input parameters (all optional):
* Data Structure Type, e.g. Array, Linked List, Tree, Graph, Heap, Hash Map, Stack, Queue.
* Algorithm Type, e.g. Dynamic Programming, Greedy, Sorting, Searching, DFS, BFS, Backtracking.
* Language for the solution. Default to Java.
* Complexity: Easy, Medium, Hard or Random. Default to Random.

Selection criteria:
* A well-known problem frequently asked in technical interviews (LeetCode, InterviewBit, HackerRank).
* The solution must be optimal in time and space.
* Mention companies known to ask it, if any.

Respond strictly in this markdown format with no other text:

### Problem: [Question Title]

**Description:**

[Full problem statement with constraints]

**Examples:**

[At least two input/output examples]

**Optimal Solution:**

```[language]
[Complete optimal implementation]
```

**Companies Asked In:**

[Companies]";

/// DSA practice problems rendered as markdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProblemKind;

impl ProblemKind {
    pub fn new() -> Self {
        Self
    }
}

impl ContentKind for ProblemKind {
    type Filters = ProblemFilters;
    type Record = SavedProblem;

    const NAME: &'static str = "problem";

    fn default_input(&self) -> &'static str {
        "Give me a problem."
    }

    fn compose(&self, input: &str, filters: &ProblemFilters, history: &[String]) -> String {
        let mut prompt = PROBLEM_PROMPT.to_string();
        prompt.push_str("\n\n--- User Provided Inputs ---");
        push_input(&mut prompt, "Data Structure Type", filters.data_structure.as_deref());
        push_input(&mut prompt, "Algorithm Type", filters.algorithm.as_deref());
        push_input(&mut prompt, "Language", filters.language.as_deref());
        push_input(&mut prompt, "Complexity", filters.complexity.as_deref());
        push_input(
            &mut prompt,
            "Other considerations",
            filters.other_considerations.as_deref(),
        );
        push_request(&mut prompt, input, self.default_input());
        if !history.is_empty() {
            prompt.push_str("\n\nDo not repeat any of these problems:");
            for title in history {
                prompt.push_str("\n- ");
                prompt.push_str(title);
            }
        }
        prompt
    }

    fn interpret(&self, response: &str, ids: &mut dyn IdSource) -> Result<GenerationResult> {
        let body = response.trim();
        if body.is_empty() {
            return Err(KismetError::Parse("problem response is empty".into()));
        }
        Ok(GenerationResult::new(
            extract_problem_title(body),
            vec![Segment::text(ids.next_id(), body, 0)],
        ))
    }

    fn to_record(
        &self,
        result: &GenerationResult,
        filters: &ProblemFilters,
        _assets: &HashMap<SegmentId, PathBuf>,
    ) -> Result<SavedProblem> {
        let title = self
            .natural_key(result)
            .ok_or_else(|| KismetError::InvalidInput("Problem has no title to save under".into()))?;
        let statement = result
            .segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut record = SavedProblem::new(title, statement);
        record.data_structure = filters.data_structure.clone();
        record.algorithm = filters.algorithm.clone();
        record.language = filters.language.clone();
        record.complexity = filters.complexity.clone();
        Ok(record)
    }

    fn from_record(&self, record: &SavedProblem) -> (GenerationResult, ProblemFilters) {
        let id = SequentialIds::new("saved").next_id();
        let mut result = GenerationResult::new(
            Some(record.title.clone()),
            vec![Segment::text(id, record.statement.clone(), 0)],
        );
        result.created_at = record.created_at;
        let filters = ProblemFilters {
            data_structure: record.data_structure.clone(),
            algorithm: record.algorithm.clone(),
            language: record.language.clone(),
            complexity: record.complexity.clone(),
            other_considerations: None,
        };
        (result, filters)
    }

    fn asset_dir(&self) -> &'static str {
        "problems"
    }
}
