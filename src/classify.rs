use serde::{Serialize, Serializer};

use crate::config::ClassifierConfig;
use crate::errors::LayoutError;
use crate::layout::Choice;

/// Outcome for one question row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerResult {
    Clear(Choice),
    Blank,
    Weak,
    Multi,
}

impl AnswerResult {
    /// Response symbol: the letter, `None` for blank, `?` weak, `X` multi.
    pub fn symbol(self) -> Option<String> {
        match self {
            AnswerResult::Clear(choice) => Some(choice.letter().to_string()),
            AnswerResult::Blank => None,
            AnswerResult::Weak => Some("?".to_string()),
            AnswerResult::Multi => Some("X".to_string()),
        }
    }
}

impl Serialize for AnswerResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.symbol().serialize(serializer)
    }
}

/// Index of the highest score; the first one on ties.
pub fn peak(scores: &[f64]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (idx, &score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((idx, score)),
        })
        .map(|(idx, _)| idx)
}

/// Classify one row of fill scores. Rules apply in order: blank, multi,
/// weak, clear.
pub fn classify_row(
    scores: &[f64],
    options: &[Choice],
    config: &ClassifierConfig,
    question: usize,
) -> Result<AnswerResult, LayoutError> {
    if scores.len() != options.len() || scores.is_empty() {
        return Err(LayoutError::OptionCount {
            question,
            expected: options.len(),
            found: scores.len(),
        });
    }
    let Some(winner) = peak(scores) else {
        return Ok(AnswerResult::Blank);
    };
    let max = scores[winner];
    let second = scores
        .iter()
        .enumerate()
        .filter(|&(idx, _)| idx != winner)
        .map(|(_, &score)| score)
        .fold(0.0, f64::max);
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;

    let result = if max <= config.floor || max < config.blank_ratio * mean {
        AnswerResult::Blank
    } else if second >= config.multi_ratio * max {
        AnswerResult::Multi
    } else if max < config.weak_ratio * mean {
        AnswerResult::Weak
    } else {
        AnswerResult::Clear(options[winner])
    };
    log::trace!("question {question}: {scores:?} -> {result:?}");
    Ok(result)
}

/// Classify every row; the row count must match the declared question count.
pub fn classify_all(
    scores: &[Vec<f64>],
    questions: usize,
    options: &[Choice],
    config: &ClassifierConfig,
) -> Result<Vec<AnswerResult>, LayoutError> {
    if scores.len() != questions {
        return Err(LayoutError::QuestionCount {
            expected: questions,
            found: scores.len(),
        });
    }
    scores
        .iter()
        .enumerate()
        .map(|(question, row)| classify_row(row, options, config, question))
        .collect()
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn classify(scores: &[f64]) -> AnswerResult {
        classify_row(scores, &Choice::ALL, &ClassifierConfig::default(), 0).unwrap()
    }

    #[test]
    fn test_floor_boundary() {
        assert_eq!(classify(&[40.0, 40.0, 40.0, 40.0]), AnswerResult::Blank);
        assert_eq!(classify(&[0.0, 40.0, 0.0, 0.0]), AnswerResult::Blank);
        assert_eq!(classify(&[0.0, 41.0, 0.0, 0.0]), AnswerResult::Clear(Choice::B));
    }

    #[test]
    fn test_multi_boundary() {
        assert_eq!(classify(&[100.0, 75.0, 0.0, 0.0]), AnswerResult::Multi);
        assert_eq!(classify(&[100.0, 74.0, 0.0, 0.0]), AnswerResult::Clear(Choice::A));
        assert_eq!(classify(&[0.0, 0.0, 300.0, 300.0]), AnswerResult::Multi);
    }

    #[test]
    fn test_weak_mark() {
        // peak above the blank ratio of the mean but under the weak ratio
        assert_eq!(classify(&[100.0, 70.0, 60.0, 60.0]), AnswerResult::Weak);
    }

    #[test]
    fn test_uniform_noise_is_blank() {
        assert_eq!(classify(&[300.0, 290.0, 310.0, 305.0]), AnswerResult::Blank);
    }

    #[test]
    fn test_rules_apply_in_order() {
        // both blank and multi match; blank wins
        assert_eq!(classify(&[30.0, 30.0, 0.0, 0.0]), AnswerResult::Blank);
    }

    #[test]
    fn test_raising_the_winner_never_weakens_it() {
        let config = ClassifierConfig::default();
        let peers = [20.0, 35.0, 50.0];
        let mut previous: Option<AnswerResult> = None;
        for step in 0..400 {
            let value = step as f64;
            let scores = [peers[0], value, peers[1], peers[2]];
            let result = classify_row(&scores, &Choice::ALL, &config, 0).unwrap();
            if previous == Some(AnswerResult::Clear(Choice::B)) {
                assert_eq!(result, AnswerResult::Clear(Choice::B), "score {value}");
            }
            if previous == Some(AnswerResult::Weak) {
                assert_ne!(result, AnswerResult::Blank, "score {value}");
            }
            previous = Some(result);
        }
        assert_eq!(previous, Some(AnswerResult::Clear(Choice::B)));
    }

    #[test]
    fn test_option_count_mismatch() {
        let config = ClassifierConfig::default();
        assert_eq!(
            classify_row(&[1.0, 2.0, 3.0], &Choice::ALL, &config, 4),
            Err(LayoutError::OptionCount {
                question: 4,
                expected: 4,
                found: 3
            })
        );
    }

    #[test]
    fn test_question_count_mismatch() {
        let config = ClassifierConfig::default();
        let scores = vec![vec![0.0; 4]; 3];
        assert_eq!(
            classify_all(&scores, 5, &Choice::ALL, &config),
            Err(LayoutError::QuestionCount {
                expected: 5,
                found: 3
            })
        );
        assert_eq!(
            classify_all(&scores, 3, &Choice::ALL, &config).unwrap(),
            vec![AnswerResult::Blank; 3]
        );
    }

    #[test]
    fn test_fewer_options() {
        let options = [Choice::A, Choice::B, Choice::C];
        let config = ClassifierConfig::default();
        assert_eq!(
            classify_row(&[0.0, 0.0, 90.0], &options, &config, 0),
            Ok(AnswerResult::Clear(Choice::C))
        );
    }

    #[test]
    fn test_peak_prefers_first() {
        assert_eq!(peak(&[1.0, 3.0, 3.0]), Some(1));
        assert_eq!(peak(&[]), None);
    }

    #[test]
    fn test_symbols() {
        let row = vec![
            AnswerResult::Clear(Choice::D),
            AnswerResult::Blank,
            AnswerResult::Weak,
            AnswerResult::Multi,
        ];
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"["D",null,"?","X"]"#
        );
    }
}
