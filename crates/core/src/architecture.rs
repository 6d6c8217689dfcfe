//! Architecture model for network-like algorithms.

use serde::{Deserialize, Serialize};

/// Kind of layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Input layer
    Input,
    /// Fully connected layer
    Dense,
    /// Convolutional layer
    Convolution,
    /// Recurrent layer
    Recurrent,
    /// Attention block
    Attention,
    /// Output layer
    Output,
}

/// One layer, ordered by `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Layer kind
    pub kind: LayerKind,
    /// Width (units, channels, heads * dim ...)
    pub size: usize,
    /// Position in the stack, starting at 0
    pub position: usize,
}

/// Kind of connection between layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Layer i to layer i + 1
    Forward,
    /// Residual connection skipping at least one layer
    Skip,
    /// Feedback connection
    Recurrent,
}

/// Directed connection between two layer positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Source position
    pub from: usize,
    /// Destination position
    pub to: usize,
    /// Connection kind
    pub kind: ConnectionKind,
}

/// Activation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Rectified linear unit
    Relu,
    /// Gaussian error linear unit
    Gelu,
    /// Hyperbolic tangent
    Tanh,
    /// Logistic sigmoid
    Sigmoid,
    /// x * sigmoid(x)
    Swish,
}

impl Activation {
    /// All activations, in a stable order.
    pub const ALL: [Activation; 5] = [
        Activation::Relu,
        Activation::Gelu,
        Activation::Tanh,
        Activation::Sigmoid,
        Activation::Swish,
    ];

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::Gelu => "gelu",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Swish => "swish",
        }
    }
}

/// Optimizer used to train the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Stochastic gradient descent
    Sgd,
    /// Adam
    Adam,
    /// Adam with decoupled weight decay
    AdamW,
    /// RMSProp
    RmsProp,
}

impl OptimizerKind {
    /// All optimizer kinds, in a stable order.
    pub const ALL: [OptimizerKind; 4] = [
        OptimizerKind::Sgd,
        OptimizerKind::Adam,
        OptimizerKind::AdamW,
        OptimizerKind::RmsProp,
    ];

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizerKind::Sgd => "sgd",
            OptimizerKind::Adam => "adam",
            OptimizerKind::AdamW => "adamw",
            OptimizerKind::RmsProp => "rmsprop",
        }
    }
}

/// Training optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Optimizer kind
    pub kind: OptimizerKind,
    /// Base learning rate
    pub learning_rate: f64,
    /// Momentum (SGD only)
    pub momentum: Option<f64>,
}

/// Regularization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regularization {
    /// Dropout probability
    pub dropout: f64,
    /// L2 weight decay
    pub weight_decay: f64,
    /// Batch normalization between layers
    pub batch_norm: bool,
}

/// Structural configuration of a neural algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureSpec {
    /// Layers ordered by position
    pub layers: Vec<Layer>,
    /// Connections between layers
    pub connections: Vec<Connection>,
    /// One activation per hidden layer
    pub activations: Vec<Activation>,
    /// Training optimizer
    pub optimizer: OptimizerSettings,
    /// Regularization
    pub regularization: Regularization,
}

impl ArchitectureSpec {
    /// Build a plain feed-forward stack: input, hidden layers, output.
    pub fn feed_forward(input: usize, hidden: &[usize], output: usize, activation: Activation) -> Self {
        let mut layers = Vec::with_capacity(hidden.len() + 2);
        layers.push(Layer { kind: LayerKind::Input, size: input, position: 0 });
        for (i, &size) in hidden.iter().enumerate() {
            layers.push(Layer { kind: LayerKind::Dense, size, position: i + 1 });
        }
        layers.push(Layer { kind: LayerKind::Output, size: output, position: hidden.len() + 1 });

        let connections = (0..layers.len() - 1)
            .map(|i| Connection { from: i, to: i + 1, kind: ConnectionKind::Forward })
            .collect();

        Self {
            layers,
            connections,
            activations: vec![activation; hidden.len()],
            optimizer: OptimizerSettings {
                kind: OptimizerKind::Adam,
                learning_rate: 1e-3,
                momentum: None,
            },
            regularization: Regularization {
                dropout: 0.1,
                weight_decay: 1e-4,
                batch_norm: false,
            },
        }
    }

    /// Number of hidden layers.
    pub fn depth(&self) -> usize {
        self.layers.len().saturating_sub(2)
    }

    /// Widths of the hidden layers.
    pub fn hidden_sizes(&self) -> Vec<usize> {
        self.layers
            .iter()
            .filter(|l| !matches!(l.kind, LayerKind::Input | LayerKind::Output))
            .map(|l| l.size)
            .collect()
    }

    /// Trainable-parameter proxy: weights plus biases of every connection.
    pub fn parameter_count(&self) -> u64 {
        let size_at = |pos: usize| -> u64 {
            self.layers.iter().find(|l| l.position == pos).map_or(0, |l| l.size as u64)
        };
        self.connections
            .iter()
            .map(|c| {
                let (from, to) = (size_at(c.from), size_at(c.to));
                match c.kind {
                    ConnectionKind::Forward => from * to + to,
                    ConnectionKind::Skip => from * to,
                    ConnectionKind::Recurrent => to * to,
                }
            })
            .sum()
    }

    /// Positions are contiguous and every connection points at existing layers.
    pub fn is_consistent(&self) -> bool {
        let positions_ok = self.layers.iter().enumerate().all(|(i, l)| l.position == i);
        let n = self.layers.len();
        let connections_ok = self.connections.iter().all(|c| c.from < n && c.to < n);
        positions_ok && connections_ok && self.activations.len() == self.depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_forward_shape() {
        let arch = ArchitectureSpec::feed_forward(10, &[32, 16], 2, Activation::Relu);
        assert_eq!(arch.depth(), 2);
        assert_eq!(arch.hidden_sizes(), vec![32, 16]);
        assert_eq!(arch.connections.len(), 3);
        assert!(arch.is_consistent());
    }

    #[test]
    fn test_parameter_count() {
        let mut arch = ArchitectureSpec::feed_forward(10, &[32, 16], 2, Activation::Relu);
        // (10*32+32) + (32*16+16) + (16*2+2)
        assert_eq!(arch.parameter_count(), 352 + 528 + 34);

        arch.connections.push(Connection { from: 1, to: 3, kind: ConnectionKind::Skip });
        assert_eq!(arch.parameter_count(), 352 + 528 + 34 + 64);
    }

    #[test]
    fn test_inconsistent_connection_detected() {
        let mut arch = ArchitectureSpec::feed_forward(4, &[8], 1, Activation::Tanh);
        arch.connections.push(Connection { from: 0, to: 9, kind: ConnectionKind::Skip });
        assert!(!arch.is_consistent());
    }
}
