//! CNN actor-critic network for grid observations
//!
//! Three same-padding convolutions keep the spatial size, so the flattened
//! feature size is `conv_channels * height * width`.

use tch::{Kind, Tensor, nn};

use super::ActorCritic;

/// Convolutional policy and value network
#[derive(Debug)]
pub struct GridActorCritic {
    conv1: nn::Conv2D,
    conv2: nn::Conv2D,
    conv3: nn::Conv2D,
    fc_common: nn::Linear,
    fc_policy: nn::Linear,
    fc_value: nn::Linear,
    shape: [i64; 3],
}

impl GridActorCritic {
    /// Create the network under `vs`
    ///
    /// # Arguments
    /// * `shape` - Observation shape `[channels, height, width]`
    /// * `num_actions` - Number of discrete actions
    /// * `conv_channels` - Channels of every convolution
    /// * `hidden_dim` - Width of the shared feature layer
    pub fn new(
        vs: &nn::Path,
        shape: [usize; 3],
        num_actions: usize,
        conv_channels: i64,
        hidden_dim: i64,
    ) -> Self {
        let [c, h, w] = shape.map(|d| d as i64);
        let conv = nn::ConvConfig { padding: 1, ..Default::default() };

        let conv1 = nn::conv2d(vs / "conv1", c, conv_channels, 3, conv);
        let conv2 = nn::conv2d(vs / "conv2", conv_channels, conv_channels, 3, conv);
        let conv3 = nn::conv2d(vs / "conv3", conv_channels, conv_channels, 3, conv);

        let flat_size = conv_channels * h * w;
        let fc_common = nn::linear(vs / "fc_common", flat_size, hidden_dim, Default::default());
        let fc_policy = nn::linear(vs / "policy", hidden_dim, num_actions as i64, Default::default());
        let fc_value = nn::linear(vs / "value", hidden_dim, 1, Default::default());

        Self { conv1, conv2, conv3, fc_common, fc_policy, fc_value, shape: [c, h, w] }
    }

    /// Forward pass
    ///
    /// Accepts `[batch, channels, height, width]` or flattened
    /// `[batch, channels * height * width]` observations and returns
    /// `(action_logits [batch, actions], values [batch, 1])`.
    pub fn forward(&self, obs: &Tensor) -> (Tensor, Tensor) {
        let [c, h, w] = self.shape;
        let x = obs
            .view([-1, c, h, w])
            .apply(&self.conv1)
            .relu()
            .apply(&self.conv2)
            .relu()
            .apply(&self.conv3)
            .relu();

        let batch_size = x.size()[0];
        let features = x.view([batch_size, -1]).apply(&self.fc_common).relu();

        (features.apply(&self.fc_policy), features.apply(&self.fc_value))
    }

    /// Sample actions
    ///
    /// Returns `(actions, log_probs, values)`, each `[batch]`.
    pub fn act(&self, obs: &Tensor) -> (Tensor, Tensor, Tensor) {
        let (logits, values) = self.forward(obs);
        let actions = logits.softmax(-1, Kind::Float).multinomial(1, true);
        let log_probs = logits.log_softmax(-1, Kind::Float).gather(1, &actions, false);
        (actions.squeeze_dim(-1), log_probs.squeeze_dim(-1), values.squeeze_dim(-1))
    }

    /// Most likely action per observation
    pub fn greedy_action(&self, obs: &Tensor) -> Tensor {
        let (logits, _) = self.forward(obs);
        logits.argmax(-1, false)
    }

    /// Evaluate stored actions
    ///
    /// Returns `(log_probs [batch], mean entropy, values [batch])`.
    pub fn evaluate_actions(&self, obs: &Tensor, actions: &Tensor) -> (Tensor, Tensor, Tensor) {
        let (logits, values) = self.forward(obs);
        let log_probs = logits.log_softmax(-1, Kind::Float);
        let probs = log_probs.exp();

        let action_log_probs = log_probs.gather(-1, &actions.unsqueeze(-1), false).squeeze_dim(-1);
        let entropy =
            -(probs * log_probs).sum_dim_intlist(-1, false, Kind::Float).mean(Kind::Float);
        (action_log_probs, entropy, values.squeeze_dim(-1))
    }
}

impl ActorCritic for GridActorCritic {
    fn get_value(&self, state: &Tensor, _rnn_hxs: &Tensor, _masks: &Tensor) -> Tensor {
        self.forward(state).1
    }

    /// The network is feed-forward; a single placeholder unit keeps the
    /// recurrent state tensor well-formed.
    fn recurrent_hidden_state_size(&self) -> i64 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    fn network() -> (nn::VarStore, GridActorCritic) {
        let vs = nn::VarStore::new(Device::Cpu);
        let net = GridActorCritic::new(&vs.root(), [5, 7, 11], 5, 8, 32);
        (vs, net)
    }

    #[test]
    fn test_forward_shapes() {
        let (_vs, net) = network();
        let obs = Tensor::rand([4, 5, 7, 11], (Kind::Float, Device::Cpu));
        let (logits, values) = net.forward(&obs);
        assert_eq!(logits.size(), vec![4, 5]);
        assert_eq!(values.size(), vec![4, 1]);

        let flat = obs.view([4, -1]);
        let (flat_logits, _) = net.forward(&flat);
        assert!(flat_logits.allclose(&logits, 1e-6, 1e-6, false));
    }

    #[test]
    fn test_act_and_evaluate() {
        let (_vs, net) = network();
        let obs = Tensor::rand([6, 5, 7, 11], (Kind::Float, Device::Cpu));
        let (actions, log_probs, values) = net.act(&obs);
        assert_eq!(actions.size(), vec![6]);
        assert_eq!(log_probs.size(), vec![6]);
        assert_eq!(values.size(), vec![6]);

        let (eval_log_probs, entropy, _) = net.evaluate_actions(&obs, &actions);
        assert!(eval_log_probs.allclose(&log_probs, 1e-5, 1e-5, false));
        let entropy = entropy.double_value(&[]);
        assert!(entropy > 0.0 && entropy <= (5f64).ln() + 1e-6);
    }

    #[test]
    fn test_get_value_ignores_recurrent_inputs() {
        let (_vs, net) = network();
        let obs = Tensor::rand([3, 5, 7, 11], (Kind::Float, Device::Cpu));
        let hxs = Tensor::zeros([3, net.recurrent_hidden_state_size()], (Kind::Float, Device::Cpu));
        let masks = Tensor::ones([3, 1], (Kind::Float, Device::Cpu));
        let value = net.get_value(&obs, &hxs, &masks);
        assert_eq!(value.size(), vec![3, 1]);
        assert!(value.allclose(&net.forward(&obs).1, 1e-6, 1e-6, false));
    }
}
