//! Metrics Module for Model Evaluation
//!
//! Provides the evaluation numbers reported after training:
//! - Micro accuracy (over all predictions)
//! - Macro accuracy (per-class recall, averaged over represented classes)
//! - Log loss over the predicted probability of the true class
//! - Confusion Matrix

use serde::{Deserialize, Serialize};

/// Probabilities are clamped to this value before taking the log
const LOG_LOSS_EPSILON: f64 = 1e-15;

/// Evaluation metrics of a fitted model on one held-out split
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Fraction of correct predictions over all samples
    pub micro_accuracy: f64,

    /// Per-class accuracy averaged over classes present in the split
    pub macro_accuracy: f64,

    /// Mean negative log-likelihood of the true class
    pub log_loss: f64,

    /// Confusion matrix (row = actual, column = predicted)
    pub confusion_matrix: ConfusionMatrix,

    /// Number of classes the model distinguishes
    pub number_of_classes: usize,

    /// Wall-clock duration of the fit, backfilled by the orchestrator
    pub training_time_seconds: f64,

    /// Size of the full training data set, backfilled by the orchestrator
    pub training_sample_count: usize,

    /// Number of samples this evaluation ran on
    pub test_sample_count: usize,
}

impl ModelMetrics {
    /// Build metrics from ground-truth class indices and per-class scores.
    ///
    /// `scores[i]` is the probability distribution predicted for sample `i`,
    /// aligned to the model's class ordering.
    pub fn from_scores(actual: &[usize], scores: &[Vec<f32>], num_classes: usize) -> Self {
        debug_assert_eq!(actual.len(), scores.len());

        let total = actual.len().min(scores.len());
        if total == 0 {
            return Self {
                confusion_matrix: ConfusionMatrix::new(num_classes),
                number_of_classes: num_classes,
                ..Self::default()
            };
        }

        let predictions: Vec<usize> = scores.iter().map(|s| argmax(s)).collect();
        let confusion_matrix = ConfusionMatrix::from_predictions(&predictions, actual, num_classes);

        let log_loss = actual
            .iter()
            .zip(scores.iter())
            .map(|(&label, probs)| {
                let p = probs.get(label).copied().unwrap_or(0.0) as f64;
                -p.max(LOG_LOSS_EPSILON).ln()
            })
            .sum::<f64>()
            / total as f64;

        Self {
            micro_accuracy: confusion_matrix.accuracy(),
            macro_accuracy: confusion_matrix.mean_class_recall(),
            log_loss,
            confusion_matrix,
            number_of_classes: num_classes,
            training_time_seconds: 0.0,
            training_sample_count: 0,
            test_sample_count: total,
        }
    }

    /// Pretty print metrics
    pub fn display(&self) -> String {
        let mut output = String::new();

        output.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str("║                    Evaluation Metrics                        ║\n");
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!("║ Micro Accuracy:    {:6.2}%                                  ║\n", self.micro_accuracy * 100.0));
        output.push_str(&format!("║ Macro Accuracy:    {:6.2}%                                  ║\n", self.macro_accuracy * 100.0));
        output.push_str(&format!("║ Log Loss:          {:8.4}                                  ║\n", self.log_loss));
        output.push_str(&format!("║ Classes:           {:6}                                    ║\n", self.number_of_classes));
        output.push_str(&format!("║ Test Samples:      {:6}                                    ║\n", self.test_sample_count));
        output.push_str(&format!("║ Training Samples:  {:6}                                    ║\n", self.training_sample_count));
        output.push_str(&format!("║ Training Time:     {:8.2}s                                 ║\n", self.training_time_seconds));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }
}

impl std::fmt::Display for ModelMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Index of the highest score (first one wins on ties)
pub fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate() {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted)
    /// Stored as a flat vector in row-major order
    pub matrix: Vec<usize>,
}

impl Default for ConfusionMatrix {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);

        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }

        cm
    }

    /// Add a single prediction to the matrix
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            let idx = actual * self.num_classes + predicted;
            self.matrix[idx] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    /// Get the total count
    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Get the number of correct predictions (diagonal sum)
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Get overall accuracy
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Get the row sums (actual class counts)
    pub fn row_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|row| (0..self.num_classes).map(|col| self.get(row, col)).sum())
            .collect()
    }

    /// Recall of each class with support, averaged
    pub fn mean_class_recall(&self) -> f64 {
        let recalls: Vec<f64> = self
            .row_sums()
            .into_iter()
            .enumerate()
            .filter(|&(_, support)| support > 0)
            .map(|(class, support)| self.get(class, class) as f64 / support as f64)
            .collect();

        if recalls.is_empty() {
            0.0
        } else {
            recalls.iter().sum::<f64>() / recalls.len() as f64
        }
    }

    /// Pretty print the confusion matrix (for small number of classes)
    pub fn display(&self, class_names: Option<&[String]>) -> String {
        let mut output = String::new();

        output.push_str("\nConfusion Matrix (rows=actual, cols=predicted):\n\n");

        let max_display = 20;
        if self.num_classes > max_display {
            output.push_str(&format!(
                "(Matrix too large to display: {}x{})\n",
                self.num_classes, self.num_classes
            ));
            output.push_str(&format!("Total samples: {}\n", self.total()));
            output.push_str(&format!("Accuracy: {:.2}%\n", self.accuracy() * 100.0));
            return output;
        }

        let short = |idx: usize, width: usize| -> String {
            match class_names.and_then(|names| names.get(idx)) {
                Some(name) => name.chars().take(width).collect(),
                None => idx.to_string(),
            }
        };

        output.push_str("          ");
        for col in 0..self.num_classes {
            output.push_str(&format!("{:>6}", short(col, 6)));
        }
        output.push('\n');

        for row in 0..self.num_classes {
            output.push_str(&format!("{:>8} ", short(row, 8)));

            for col in 0..self.num_classes {
                let count = self.get(row, col);
                if row == col {
                    output.push_str(&format!("[{:>4}]", count));
                } else if count > 0 {
                    output.push_str(&format!(" {:>4} ", count));
                } else {
                    output.push_str("    . ");
                }
            }
            output.push('\n');
        }

        output.push_str(&format!("\nAccuracy: {:.2}%\n", self.accuracy() * 100.0));

        output
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix() {
        let predictions = vec![0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let ground_truth = vec![0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(cm.get(0, 0), 3);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.get(2, 2), 3);
        assert_eq!(cm.total(), 10);
        assert_eq!(cm.correct(), 7);
        assert!((cm.accuracy() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_macro_accuracy_averages_class_recall() {
        // class 0: 3/3 correct, class 1: 1/3 correct
        let predictions = vec![0, 0, 0, 1, 0, 0];
        let ground_truth = vec![0, 0, 0, 1, 1, 1];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 2);
        assert!((cm.mean_class_recall() - (1.0 + 1.0 / 3.0) / 2.0).abs() < 1e-9);
        assert!((cm.accuracy() - 4.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_from_scores() {
        let actual = vec![0, 1, 1];
        let scores = vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.6, 0.4]];

        let metrics = ModelMetrics::from_scores(&actual, &scores, 2);

        assert_eq!(metrics.test_sample_count, 3);
        assert_eq!(metrics.number_of_classes, 2);
        assert!((metrics.micro_accuracy - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.macro_accuracy - 0.75).abs() < 1e-9);

        let expected_loss = -((0.9f32 as f64).ln() + (0.8f32 as f64).ln() + (0.4f32 as f64).ln()) / 3.0;
        assert!((metrics.log_loss - expected_loss).abs() < 1e-6);
    }

    #[test]
    fn test_log_loss_is_finite_for_zero_probability() {
        let metrics = ModelMetrics::from_scores(&[1], &[vec![1.0, 0.0]], 2);
        assert!(metrics.log_loss.is_finite());
        assert!(metrics.log_loss > 30.0);
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = ModelMetrics::from_scores(&[], &[], 4);
        assert_eq!(metrics.test_sample_count, 0);
        assert_eq!(metrics.micro_accuracy, 0.0);
        assert_eq!(metrics.confusion_matrix.num_classes, 4);
    }

    #[test]
    fn test_argmax_first_wins_on_tie() {
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[]), 0);
    }
}
