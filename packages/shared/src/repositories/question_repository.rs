use std::collections::HashMap;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::models::question::{Difficulty, QuestionRef};

/// Picks the problem a new session will be played on. Question content lives elsewhere.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn pick_question(&self, difficulty: Difficulty) -> Option<QuestionRef>;
}

pub struct InMemoryQuestionRepository {
    questions: HashMap<Difficulty, Vec<String>>,
}

impl InMemoryQuestionRepository {
    pub fn new(questions: HashMap<Difficulty, Vec<String>>) -> Self {
        Self { questions }
    }

    pub fn single(name: &str, difficulty: Difficulty) -> Self {
        Self::new(HashMap::from([(difficulty, vec![name.to_string()])]))
    }
}

impl Default for InMemoryQuestionRepository {
    fn default() -> Self {
        let catalog = [
            (
                Difficulty::Easy,
                vec!["two-sum", "valid-anagram", "palindrome-number", "fizzbuzz"],
            ),
            (
                Difficulty::Medium,
                vec!["group-anagrams", "merge-intervals", "spiral-matrix", "coin-change"],
            ),
            (
                Difficulty::Hard,
                vec!["alien-dictionary", "word-ladder", "edit-distance", "burst-balloons"],
            ),
        ];
        Self::new(
            catalog
                .into_iter()
                .map(|(difficulty, names)| {
                    (difficulty, names.into_iter().map(str::to_string).collect())
                })
                .collect(),
        )
    }
}

#[async_trait]
impl QuestionRepository for InMemoryQuestionRepository {
    async fn pick_question(&self, difficulty: Difficulty) -> Option<QuestionRef> {
        let mut rng = rand::thread_rng();
        self.questions
            .get(&difficulty)
            .and_then(|names| names.choose(&mut rng))
            .map(|name| QuestionRef::new(name, difficulty))
    }
}
