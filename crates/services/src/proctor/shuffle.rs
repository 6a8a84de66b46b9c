//! Question and choice permutation.

use rand::Rng;
use rand::seq::SliceRandom;

use escape_core::model::Question;

/// Shuffle the whole bank, keep the first `subset` questions and shuffle each
/// question's choices. A bank smaller than `subset` yields every question.
pub fn shuffle_question_set<R: Rng + ?Sized>(
    mut bank: Vec<Question>,
    subset: usize,
    rng: &mut R,
) -> Vec<Question> {
    bank.shuffle(rng);
    bank.truncate(subset);
    bank.iter().map(|q| shuffle_choices(q, rng)).collect()
}

/// Permute a question's choices, tracking where the correct one lands.
pub fn shuffle_choices<R: Rng + ?Sized>(question: &Question, rng: &mut R) -> Question {
    let mut order: Vec<usize> = (0..question.choice_count()).collect();
    order.shuffle(rng);
    question
        .permuted(&order)
        .unwrap_or_else(|| question.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use escape_core::model::QuestionId;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn bank(n: u64) -> Vec<Question> {
        (1..=n)
            .map(|id| {
                let choices = (0..4).map(|c| format!("q{id}-c{c}")).collect();
                Question::new(QuestionId::new(id), format!("Question {id}"), choices, 2).unwrap()
            })
            .collect()
    }

    #[test]
    fn correct_choice_follows_the_permutation() {
        let original = bank(20);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..25 {
            let set = shuffle_question_set(original.clone(), 8, &mut rng);
            assert_eq!(set.len(), 8);
            for q in &set {
                let source = original.iter().find(|o| o.id() == q.id()).unwrap();
                assert_eq!(
                    q.choices()[q.correct_choice()],
                    source.choices()[source.correct_choice()]
                );
                let mut before = source.choices().to_vec();
                let mut after = q.choices().to_vec();
                before.sort();
                after.sort();
                assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn subset_has_distinct_questions() {
        let mut rng = StdRng::seed_from_u64(11);
        let set = shuffle_question_set(bank(50), 8, &mut rng);
        let mut ids: Vec<_> = set.iter().map(Question::id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn small_bank_shrinks_subset() {
        let mut rng = StdRng::seed_from_u64(3);
        let set = shuffle_question_set(bank(5), 8, &mut rng);
        assert_eq!(set.len(), 5);
    }
}
