//! Audio graph - owns nodes, connections, and message queues.
//!
//! Connections are port-indexed directed edges. Fan-out from one output port
//! and fan-in to one input port are both allowed; fan-in is summed before the
//! consuming node runs. The graph is evaluated one 64-sample block at a time
//! in topological order, so every producer has written its outputs before any
//! of its consumers read them.

use core::marker::PhantomData;

use dasp_graph::Buffer;
use hashbrown::HashMap;
use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::node::{AudioNode, NodeId, ProcessContext};

/// Message queue capacity per node. Messages beyond this are rejected by
/// [`Handle::send`] until the node drains its queue.
const MESSAGE_QUEUE_SIZE: usize = 64;

/// A handle for sending messages to a node in the audio graph.
///
/// Handles are returned when you add a node and provide two capabilities:
/// 1. **Identity** - [`Handle::id`] names the node for connect/disconnect calls
/// 2. **Messages** - Send parameter updates via [`Handle::send`]
///
/// # Message Delivery
///
/// Messages are buffered in a lock-free ring buffer and processed at the start
/// of the node's next audio block. If the buffer is full, [`Handle::send`]
/// returns `Err(msg)` with the message that couldn't be sent.
pub struct Handle<M: Send + 'static> {
    pub(crate) node_id: NodeId,
    pub(crate) sender: Producer<M>,
    pub(crate) _marker: PhantomData<M>,
}

impl<M: Send + 'static> Handle<M> {
    /// Send a message to the node.
    ///
    /// The message is applied at the start of the node's next audio block.
    /// This is lock-free and safe to call from any thread.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the message was queued successfully
    /// - `Err(msg)` if the queue is full (message dropped)
    pub fn send(&mut self, msg: M) -> Result<(), M> {
        self.sender.push(msg).map_err(|rtrb::PushError::Full(m)| m)
    }

    /// The id of the node this handle controls.
    pub fn id(&self) -> NodeId {
        self.node_id
    }
}

/// A snapshot of one directed edge in the graph.
///
/// Returned by [`AudioGraph::connections`] for wiring introspection.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Connection {
    /// Producing node.
    pub from: NodeId,
    /// Output port on the producer.
    pub from_port: usize,
    /// Consuming node.
    pub to: NodeId,
    /// Input port on the consumer.
    pub to_port: usize,
}

// Type-erased wrapper so we can store heterogeneous nodes
trait ErasedNode: Send {
    fn process_erased(&mut self, ctx: &ProcessContext, inputs: &[Buffer], outputs: &mut [Buffer]);
}

struct NodeWrapper<N: AudioNode> {
    node: N,
    receiver: Consumer<N::Message>,
}

impl<N: AudioNode> ErasedNode for NodeWrapper<N> {
    fn process_erased(&mut self, ctx: &ProcessContext, inputs: &[Buffer], outputs: &mut [Buffer]) {
        // Split borrow to avoid conflict between receiver and node
        let receiver = &mut self.receiver;
        let node = &mut self.node;

        // Draining iterator directly from the consumer - no allocation
        let messages = core::iter::from_fn(|| receiver.pop().ok());
        node.process(ctx, messages, inputs, outputs);
    }
}

struct NodeSlot {
    id: NodeId,
    node: Box<dyn ErasedNode>,
    /// Per-port fan-in accumulators, zeroed and re-summed each block
    inputs: Vec<Buffer>,
    /// Per-port output buffers, read by downstream consumers
    outputs: Vec<Buffer>,
    num_inputs: usize,
    num_outputs: usize,
}

/// Port mapping carried on each edge
#[derive(Clone, Copy, Debug)]
struct PortMap {
    from_port: usize,
    to_port: usize,
}

type InnerGraph = petgraph::graph::Graph<NodeSlot, PortMap>;

/// An audio processing graph at a fixed sample rate.
pub(crate) struct AudioGraph {
    graph: InnerGraph,
    ctx: ProcessContext,

    node_indices: HashMap<NodeId, NodeIndex>,
    next_node_id: u32,

    /// Evaluation order plus each node's incoming (producer, from_port, to_port)
    /// list, rebuilt lazily after any wiring change
    schedule: Vec<(NodeIndex, Vec<(NodeIndex, usize, usize)>)>,
    dirty: bool,
}

impl AudioGraph {
    /// Create a new graph with the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            graph: InnerGraph::with_capacity(16, 32),
            ctx: ProcessContext {
                sample_rate,
                buffer_size: Buffer::LEN,
            },
            node_indices: HashMap::new(),
            next_node_id: 0,
            schedule: Vec::new(),
            dirty: true,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.ctx.sample_rate
    }

    /// Add a node, returns a handle for sending messages
    pub fn add<N: AudioNode>(&mut self, node: N) -> Handle<N::Message> {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let (producer, consumer) = RingBuffer::new(MESSAGE_QUEUE_SIZE);

        let num_inputs = node.num_inputs();
        let num_outputs = node.num_outputs();
        let wrapper = NodeWrapper {
            node,
            receiver: consumer,
        };

        let slot = NodeSlot {
            id,
            node: Box::new(wrapper),
            inputs: vec![Buffer::SILENT; num_inputs],
            outputs: vec![Buffer::SILENT; num_outputs],
            num_inputs,
            num_outputs,
        };

        let idx = self.graph.add_node(slot);
        self.node_indices.insert(id, idx);
        self.dirty = true;

        Handle {
            node_id: id,
            sender: producer,
            _marker: PhantomData,
        }
    }

    /// Remove a node and every connection touching it.
    ///
    /// No-op if the node was already removed.
    pub fn remove(&mut self, id: NodeId) {
        let Some(idx) = self.node_indices.remove(&id) else {
            return;
        };
        self.graph.remove_node(idx);
        // remove_node swap-removes: whatever node held the last index now
        // holds `idx`, so its map entry must be patched
        if let Some(moved) = self.graph.node_weight(idx) {
            self.node_indices.insert(moved.id, idx);
        }
        self.dirty = true;
    }

    /// Connect `from` to `to` pairwise across matching ports.
    ///
    /// Port `p` of the producer is wired to port `p` of the consumer for
    /// `p < min(producer outputs, consumer inputs)`. A stereo source into a
    /// stereo consumer becomes two edges.
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        let (Some(&a), Some(&b)) = (self.node_indices.get(&from), self.node_indices.get(&to))
        else {
            tracing::warn!(?from, ?to, "connect: unknown node");
            return;
        };
        let ports = self.graph[a].num_outputs.min(self.graph[b].num_inputs);
        for p in 0..ports {
            self.graph.add_edge(a, b, PortMap { from_port: p, to_port: p });
        }
        self.dirty = true;
    }

    /// Connect a single output port to a single input port.
    pub fn connect_port(&mut self, from: NodeId, from_port: usize, to: NodeId, to_port: usize) {
        let (Some(&a), Some(&b)) = (self.node_indices.get(&from), self.node_indices.get(&to))
        else {
            tracing::warn!(?from, ?to, "connect_port: unknown node");
            return;
        };
        if from_port >= self.graph[a].num_outputs || to_port >= self.graph[b].num_inputs {
            tracing::warn!(
                ?from,
                from_port,
                ?to,
                to_port,
                "connect_port: port out of range, connection ignored"
            );
            return;
        }
        self.graph.add_edge(a, b, PortMap { from_port, to_port });
        self.dirty = true;
    }

    /// Remove every connection into or out of `id`.
    ///
    /// Idempotent: disconnecting an unwired (or unknown) node is a no-op.
    pub fn disconnect_all(&mut self, id: NodeId) {
        let Some(&idx) = self.node_indices.get(&id) else {
            return;
        };
        // Edge indices shift on removal, so re-scan after each one
        loop {
            let next = self.graph.edge_indices().find(|&e| {
                self.graph
                    .edge_endpoints(e)
                    .map(|(a, b)| a == idx || b == idx)
                    .unwrap_or(false)
            });
            match next {
                Some(e) => {
                    self.graph.remove_edge(e);
                }
                None => break,
            }
        }
        self.dirty = true;
    }

    /// Snapshot of every connection in the graph.
    pub fn connections(&self) -> Vec<Connection> {
        self.graph
            .edge_indices()
            .filter_map(|e| {
                let (a, b) = self.graph.edge_endpoints(e)?;
                let ports = self.graph.edge_weight(e)?;
                Some(Connection {
                    from: self.graph[a].id,
                    from_port: ports.from_port,
                    to: self.graph[b].id,
                    to_port: ports.to_port,
                })
            })
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn rebuild_schedule(&mut self) {
        let order = match toposort(&self.graph, None) {
            Ok(order) => order,
            Err(_) => {
                // Fixed topologies cannot cycle; if a custom wiring does,
                // refuse to process rather than recurse forever
                tracing::error!("audio graph contains a cycle, processing disabled");
                Vec::new()
            }
        };

        let mut incoming: HashMap<NodeIndex, Vec<(NodeIndex, usize, usize)>> = HashMap::new();
        for e in self.graph.edge_indices() {
            if let (Some((a, b)), Some(ports)) =
                (self.graph.edge_endpoints(e), self.graph.edge_weight(e))
            {
                incoming
                    .entry(b)
                    .or_default()
                    .push((a, ports.from_port, ports.to_port));
            }
        }

        self.schedule = order
            .into_iter()
            .map(|idx| (idx, incoming.remove(&idx).unwrap_or_default()))
            .collect();
        self.dirty = false;
    }

    /// Process one block of audio through the whole graph.
    pub fn process(&mut self) {
        if self.dirty {
            self.rebuild_schedule();
        }
        let ctx = self.ctx;

        for (idx, in_edges) in &self.schedule {
            // Zero the fan-in accumulators
            {
                let slot = &mut self.graph[*idx];
                for buf in slot.inputs.iter_mut() {
                    buf.silence();
                }
            }

            // Sum every incoming edge into its target port
            for &(src, from_port, to_port) in in_edges {
                let produced = self.graph[src].outputs[from_port].clone();
                let slot = &mut self.graph[*idx];
                for (acc, s) in slot.inputs[to_port].iter_mut().zip(produced.iter()) {
                    *acc += *s;
                }
            }

            let NodeSlot {
                node,
                inputs,
                outputs,
                ..
            } = &mut self.graph[*idx];
            node.process_erased(&ctx, inputs, outputs);
        }
    }
}
