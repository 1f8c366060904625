//! Loss criteria

use crate::autograd::Var;
use crate::nn::LogSoftmax;

/// Mean squared error between two vectors of values
pub struct MseLoss;

impl MseLoss {
    pub fn call<T, U>(y_pred: &[T], y_true: &[U]) -> Var
    where
        T: AsRef<Var>,
        U: AsRef<Var>,
    {
        let loss = y_pred
            .iter()
            .zip(y_true.iter())
            .map(|(a, b)| (a.as_ref() - b.as_ref()).pow(&Var::new(2.0)))
            .sum::<Var>();
        loss / Var::new(y_pred.len() as f32)
    }
}

/// Binary cross-entropy over probabilities in (0, 1):
/// `-mean(y ln p + (1 - y) ln(1 - p))`
pub struct BceLoss;

impl BceLoss {
    pub fn call<T, U>(y_pred: &[T], y_true: &[U]) -> Var
    where
        T: AsRef<Var>,
        U: AsRef<Var>,
    {
        let one = Var::new(1.0);
        let loss = y_pred
            .iter()
            .zip(y_true.iter())
            .map(|(p, y)| {
                let p = p.as_ref();
                let y = y.as_ref();
                let pos = y * &p.ln();
                let neg = &(&one - y) * &(&one - p).ln();
                -&(&pos + &neg)
            })
            .sum::<Var>();
        loss / Var::new(y_pred.len() as f32)
    }
}

/// Negative log-likelihood over log-probabilities with a one-hot target:
/// `-sum_i t_i * logp_i`, i.e. the negative log-probability of the true class
pub struct NllLoss;

impl NllLoss {
    pub fn call<T, U>(log_probs: &[T], target: &[U]) -> Var
    where
        T: AsRef<Var>,
        U: AsRef<Var>,
    {
        let picked = log_probs
            .iter()
            .zip(target.iter())
            .map(|(lp, t)| t.as_ref() * lp.as_ref())
            .sum::<Var>();
        -&picked
    }
}

/// Cross-entropy over raw logits: LogSoftmax followed by [`NllLoss`]
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    pub fn call<T, U>(logits: &[T], target: &[U]) -> Var
    where
        T: AsRef<Var>,
        U: AsRef<Var>,
    {
        let logits: Vec<Var> = logits.iter().map(|v| v.as_ref().clone()).collect();
        let log_probs = LogSoftmax::new().forward(&logits);
        NllLoss::call(&log_probs, target)
    }
}

#[cfg(test)]
mod tests {
    use crate::assert_eq_float;

    use super::*;

    #[test]
    fn test_mse_loss() {
        let y_pred = vec![Var::new(2.0), Var::new(3.0)];
        let y_true = vec![Var::new(1.0), Var::new(5.0)];
        let loss = MseLoss::call(&y_pred, &y_true);
        assert_eq!(loss.data(), 2.5);

        loss.backward();
        // dloss / dy_pred = 1/N * 2 * (y_pred - y_true)
        // dloss / dy_true = -1/N * 2 * (y_pred - y_true)
        assert_eq!(y_pred[0].grad(), 1.0);
        assert_eq!(y_pred[1].grad(), -2.0);
        assert_eq!(y_true[0].grad(), -1.0);
        assert_eq!(y_true[1].grad(), 2.0);
    }

    #[test]
    fn test_bce_loss() {
        let y_pred = vec![Var::new(0.9), Var::new(0.2)];
        let y_true = vec![Var::new(1.0), Var::new(0.0)];
        let loss = BceLoss::call(&y_pred, &y_true);
        let expected = -(0.9f32.ln() + 0.8f32.ln()) / 2.0;
        assert_eq_float!(loss.data(), expected);

        loss.backward();
        // dloss/dp = -1/N * (y/p - (1-y)/(1-p))
        assert_eq_float!(y_pred[0].grad(), -0.5 * (1.0 / 0.9));
        assert_eq_float!(y_pred[1].grad(), 0.5 * (1.0 / 0.8));
    }

    #[test]
    fn test_nll_loss_picks_target_class() {
        let log_probs = vec![
            Var::new(0.2f32.ln()),
            Var::new(0.7f32.ln()),
            Var::new(0.1f32.ln()),
        ];
        let target = vec![Var::new(0.0), Var::new(1.0), Var::new(0.0)];
        let loss = NllLoss::call(&log_probs, &target);
        assert_eq_float!(loss.data(), -(0.7f32.ln()));

        loss.backward();
        // only the target class contributes gradient
        assert_eq_float!(log_probs[0].grad(), 0.0);
        assert_eq_float!(log_probs[1].grad(), -1.0);
        assert_eq_float!(log_probs[2].grad(), 0.0);
    }

    #[test]
    fn test_cross_entropy_matches_log_softmax_nll() {
        let logits = vec![Var::new(1.0), Var::new(-0.5), Var::new(0.25)];
        let target = vec![Var::new(1.0), Var::new(0.0), Var::new(0.0)];

        let ce = CrossEntropyLoss::call(&logits, &target);
        let log_probs = LogSoftmax::new().forward(&logits);
        let nll = NllLoss::call(&log_probs, &target);
        assert_eq_float!(ce.data(), nll.data());

        // gradient of cross-entropy w.r.t. logits is softmax - target
        ce.backward();
        let exp_sum: f32 = logits.iter().map(|v| v.data().exp()).sum();
        for (logit, t) in logits.iter().zip(target.iter()) {
            let softmax = logit.data().exp() / exp_sum;
            assert_eq_float!(logit.grad(), softmax - t.data());
        }
    }
}
