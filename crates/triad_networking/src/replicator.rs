//! # Replicator
//!
//! Owns the networked-entity table of one peer and runs both halves of the
//! replication loop on the game thread.
//!
//! ## Pipeline
//!
//! ```text
//!   transport threads                         game thread
//! ┌──────────────────┐  InboundSender   ┌──────────────────────────────┐
//! │ channel "message"│ ───────────────▶ │ inbound queue (FIFO)         │
//! └──────────────────┘   decode + tag   │   receive(): once per tick   │
//!                                       │     Create → on_create       │
//!                                       │     Update → arbitrate       │
//!                                       │     Delete → on_delete       │
//!                                       │                              │
//! ┌──────────────────┐   DataChannel    │   send(): every N ms         │
//! │ peers            │ ◀─────────────── │     unsent  → Create         │
//! └──────────────────┘                  │     owned   → Update         │
//!                                       │     (Create to first-sync)   │
//!                                       │     deleted → Delete         │
//!                                       └──────────────────────────────┘
//! ```
//!
//! There are no acks. A dropped Update is repaired by the next one; a late
//! joiner is repaired by first-sync promotion.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use triad_core::{EntityArena, EntityId};

use crate::channel::DataChannel;
use crate::error::{ProtocolError, ReplicationError, ReplicationResult};
use crate::id::{NetworkId, NetworkIdAllocator};
use crate::ownership::OwnershipStamp;
use crate::participant::{ParticipantId, ParticipantRegistry};
use crate::protocol::NetworkMessage;
use crate::template::{NetworkTemplate, TemplateContext, TemplateId};

/// Replication metadata of one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkedEntity {
    /// Globally unique id.
    pub network_id: NetworkId,
    /// Callback set.
    pub template_id: TemplateId,
    /// Current owner.
    pub owner: ParticipantId,
    /// When the owner took ownership.
    pub last_owned: u32,
    /// Whether the initial Create went out. Only meaningful while owned.
    pub sent: bool,
}

/// A decoded message tagged with the peer it came from.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// Session-local id of the sender.
    pub sender: ParticipantId,
    /// Protocol-level id of the sender; used for arbitration.
    pub sender_user: Arc<str>,
    /// The message.
    pub message: NetworkMessage,
}

/// Handle the transport uses to feed frames from one peer into the
/// replicator. Cloneable and `Send`; pushing never blocks.
#[derive(Clone)]
pub struct InboundSender {
    sender: ParticipantId,
    sender_user: Arc<str>,
    queue: Sender<InboundMessage>,
}

impl InboundSender {
    /// Participant this handle is bound to.
    #[must_use]
    pub fn participant(&self) -> ParticipantId {
        self.sender
    }

    /// Decodes one text frame and queues it.
    ///
    /// # Errors
    ///
    /// Malformed frames are logged, dropped and returned as errors.
    pub fn push(&self, frame: &str) -> Result<(), ProtocolError> {
        match NetworkMessage::decode(frame) {
            Ok(message) => {
                self.push_message(message);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(participant = %self.sender, %err, "dropping malformed frame");
                Err(err)
            }
        }
    }

    /// Queues an already decoded message.
    pub fn push_message(&self, message: NetworkMessage) {
        let inbound = InboundMessage {
            sender: self.sender,
            sender_user: Arc::clone(&self.sender_user),
            message,
        };
        if self.queue.send(inbound).is_err() {
            tracing::debug!(participant = %self.sender, "replicator gone; frame dropped");
        }
    }
}

/// What one network tick sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkTickStats {
    /// Entities announced for the first time.
    pub creates: usize,
    /// Entities re-broadcast.
    pub updates: usize,
    /// Deletions announced.
    pub deletes: usize,
    /// Frames handed to channels.
    pub frames: usize,
}

struct PeerChannel {
    participant: ParticipantId,
    channel: Box<dyn DataChannel>,
    /// Has not received a broadcast yet; gets Creates instead of Updates.
    first_sync: bool,
}

/// Peer-to-peer replication of networked entities.
pub struct Replicator<W> {
    participants: ParticipantRegistry,
    templates: Vec<Box<dyn NetworkTemplate<W>>>,
    entities: EntityArena<NetworkedEntity>,
    by_network_id: HashMap<NetworkId, EntityId>,
    ids: NetworkIdAllocator,
    channels: Vec<PeerChannel>,
    pending_deletes: Vec<NetworkId>,
    inbound_tx: Sender<InboundMessage>,
    inbound_rx: Receiver<InboundMessage>,
    network_tick_interval_ms: u32,
    last_network_tick: Option<u32>,
}

impl<W> Replicator<W> {
    /// Creates a replicator for the local peer `local_user_id`.
    pub fn new(
        local_user_id: impl Into<Arc<str>>,
        network_tick_interval_ms: u32,
        ids: NetworkIdAllocator,
    ) -> Self {
        let (inbound_tx, inbound_rx) = unbounded();
        Self {
            participants: ParticipantRegistry::new(local_user_id),
            templates: Vec::new(),
            entities: EntityArena::new(),
            by_network_id: HashMap::new(),
            ids,
            channels: Vec::new(),
            pending_deletes: Vec::new(),
            inbound_tx,
            inbound_rx,
            network_tick_interval_ms,
            last_network_tick: None,
        }
    }

    // =========================================================================
    // Templates
    // =========================================================================

    /// Registers a template and returns its id (sequential from 0).
    pub fn register_template<T: NetworkTemplate<W> + 'static>(&mut self, template: T) -> TemplateId {
        let id = TemplateId(u32::try_from(self.templates.len()).unwrap_or(u32::MAX));
        self.templates.push(Box::new(template));
        id
    }

    fn template(&self, id: TemplateId) -> ReplicationResult<&dyn NetworkTemplate<W>> {
        self.templates
            .get(id.0 as usize)
            .map(AsRef::as_ref)
            .ok_or(ReplicationError::UnknownTemplate(id))
    }

    // =========================================================================
    // Local entities
    // =========================================================================

    /// Creates a locally owned entity with a fresh random network id.
    pub fn spawn(&mut self, template_id: TemplateId, now_ms: u32) -> ReplicationResult<EntityId> {
        self.template(template_id)?;
        let live = &self.by_network_id;
        let network_id = self.ids.allocate(|id| live.contains_key(&id));
        Ok(self.insert_local(network_id, template_id, now_ms))
    }

    /// Creates a locally owned entity with a caller-chosen network id.
    pub fn spawn_with_id(
        &mut self,
        network_id: NetworkId,
        template_id: TemplateId,
        now_ms: u32,
    ) -> ReplicationResult<EntityId> {
        self.template(template_id)?;
        if network_id.is_null() {
            return Err(ReplicationError::ReservedNetworkId(network_id));
        }
        if self.by_network_id.contains_key(&network_id) {
            return Err(ReplicationError::DuplicateNetworkId(network_id));
        }
        Ok(self.insert_local(network_id, template_id, now_ms))
    }

    fn insert_local(&mut self, network_id: NetworkId, template_id: TemplateId, now_ms: u32) -> EntityId {
        let key = self.entities.insert(NetworkedEntity {
            network_id,
            template_id,
            owner: ParticipantId::LOCAL,
            last_owned: now_ms,
            sent: false,
        });
        self.by_network_id.insert(network_id, key);
        tracing::debug!(%network_id, entity = %key, "networked entity spawned");
        key
    }

    /// Removes an entity. If it was ours and peers know it, a Delete goes
    /// out on the next network tick.
    pub fn despawn(&mut self, entity: EntityId) -> ReplicationResult<NetworkedEntity> {
        let removed = self
            .entities
            .remove(entity)
            .ok_or(ReplicationError::UnknownEntity(entity))?;
        self.by_network_id.remove(&removed.network_id);
        if removed.owner.is_local() && removed.sent {
            self.pending_deletes.push(removed.network_id);
        }
        Ok(removed)
    }

    /// Claims ownership of an entity.
    ///
    /// The new stamp is `now_ms`, bumped past the current stamp if the clock
    /// lags, so the claim always beats the state it was taken from.
    pub fn take_ownership(&mut self, entity: EntityId, now_ms: u32) -> ReplicationResult<()> {
        let record = self
            .entities
            .get_mut(entity)
            .ok_or(ReplicationError::UnknownEntity(entity))?;
        record.owner = ParticipantId::LOCAL;
        record.last_owned = now_ms.max(record.last_owned.saturating_add(1));
        tracing::debug!(network_id = %record.network_id, last_owned = record.last_owned, "ownership taken");
        Ok(())
    }

    /// Whether the local peer owns the entity.
    #[must_use]
    pub fn is_mine(&self, entity: EntityId) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|record| record.owner.is_local())
    }

    /// Replication metadata of an entity.
    #[must_use]
    pub fn entity(&self, entity: EntityId) -> Option<&NetworkedEntity> {
        self.entities.get(entity)
    }

    /// Local key of a network id.
    #[must_use]
    pub fn lookup(&self, network_id: NetworkId) -> Option<EntityId> {
        self.by_network_id.get(&network_id).copied()
    }

    /// All networked entities.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &NetworkedEntity)> + '_ {
        self.entities.iter()
    }

    /// Number of networked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether there are no networked entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // =========================================================================
    // Peers
    // =========================================================================

    /// Adds a peer with an open channel. Returns the handle its transport
    /// pushes inbound frames into.
    ///
    /// The peer gets a full Create for every entity we own on the next
    /// network tick. A user that reconnects replaces its old channel.
    pub fn open_channel(
        &mut self,
        user_id: impl Into<Arc<str>>,
        channel: Box<dyn DataChannel>,
    ) -> InboundSender {
        let user_id: Arc<str> = user_id.into();
        if let Some(previous) = self.participants.participant_id(&user_id) {
            if !previous.is_local() {
                self.drop_channel(previous);
            }
        }

        let participant = self.participants.add(Arc::clone(&user_id));
        self.channels.push(PeerChannel {
            participant,
            channel,
            first_sync: true,
        });
        tracing::info!(%participant, user = %user_id, "peer channel opened");

        InboundSender {
            sender: participant,
            sender_user: user_id,
            queue: self.inbound_tx.clone(),
        }
    }

    /// Removes a peer whose channel closed. Frames it already queued still
    /// apply. Returns false if the user was not connected.
    pub fn close_channel(&mut self, user_id: &str) -> bool {
        let Some(participant) = self.participants.participant_id(user_id) else {
            return false;
        };
        if participant.is_local() {
            return false;
        }
        self.drop_channel(participant);
        self.participants.remove(participant);
        tracing::info!(%participant, user = %user_id, "peer channel closed");
        true
    }

    fn drop_channel(&mut self, participant: ParticipantId) {
        self.channels.retain_mut(|peer| {
            if peer.participant == participant {
                peer.channel.close();
                false
            } else {
                true
            }
        });
    }

    /// Closes every channel and forgets every peer.
    pub fn dispose(&mut self) {
        for mut peer in self.channels.drain(..) {
            peer.channel.close();
            self.participants.remove(peer.participant);
        }
        tracing::debug!("replicator disposed");
    }

    /// Participant registry.
    #[must_use]
    pub fn participants(&self) -> &ParticipantRegistry {
        &self.participants
    }

    /// Number of open peer channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    // =========================================================================
    // Receive
    // =========================================================================

    /// Applies every queued inbound message in arrival order.
    pub fn receive(&mut self, world: &mut W) -> usize {
        let mut applied = 0;
        while let Ok(inbound) = self.inbound_rx.try_recv() {
            self.apply(world, inbound);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, world: &mut W, inbound: InboundMessage) {
        let InboundMessage {
            sender,
            sender_user,
            message,
        } = inbound;

        match message {
            NetworkMessage::Create {
                network_id,
                template_id,
                last_owned,
                data,
            } => {
                if let Some(entity) = self.lookup(network_id) {
                    self.apply_claim(world, entity, sender, &sender_user, last_owned, &data);
                    return;
                }
                let Some(template) = self.templates.get(template_id.0 as usize) else {
                    tracing::warn!(%network_id, %template_id, "create for unknown template dropped");
                    return;
                };
                let entity = self.entities.insert(NetworkedEntity {
                    network_id,
                    template_id,
                    owner: sender,
                    last_owned,
                    sent: true,
                });
                self.by_network_id.insert(network_id, entity);

                let ctx = TemplateContext {
                    entity,
                    network_id,
                    sender,
                };
                if let Err(err) = template.on_create(world, &ctx, &data) {
                    tracing::warn!(%network_id, %err, "remote create rejected");
                    self.entities.remove(entity);
                    self.by_network_id.remove(&network_id);
                }
            }
            NetworkMessage::Update {
                network_id,
                last_owned,
                data,
            } => {
                let Some(entity) = self.lookup(network_id) else {
                    tracing::warn!(%network_id, participant = %sender, "update for unknown entity dropped");
                    return;
                };
                self.apply_claim(world, entity, sender, &sender_user, last_owned, &data);
            }
            NetworkMessage::Delete { network_id } => {
                let Some(entity) = self.by_network_id.remove(&network_id) else {
                    return;
                };
                let Some(removed) = self.entities.remove(entity) else {
                    return;
                };
                if let Some(template) = self.templates.get(removed.template_id.0 as usize) {
                    let ctx = TemplateContext {
                        entity,
                        network_id,
                        sender,
                    };
                    template.on_delete(world, &ctx);
                }
                tracing::debug!(%network_id, participant = %sender, "remote delete applied");
            }
        }
    }

    /// Applies remote state if the sender owns the entity or its claim wins.
    fn apply_claim(
        &mut self,
        world: &mut W,
        entity: EntityId,
        sender: ParticipantId,
        sender_user: &Arc<str>,
        last_owned: u32,
        data: &serde_json::Value,
    ) {
        let Some(record) = self.entities.get_mut(entity) else {
            return;
        };

        let current = OwnershipStamp::new(
            record.last_owned,
            self.participants.user_id(record.owner).cloned(),
        );
        let claim = OwnershipStamp::new(last_owned, Some(Arc::clone(sender_user)));
        let same_owner = current.owner.as_ref() == claim.owner.as_ref() && current.last_owned == last_owned;

        if !same_owner && !claim.wins_over(&current) {
            tracing::debug!(
                network_id = %record.network_id,
                participant = %sender,
                claim = last_owned,
                current = record.last_owned,
                "stale claim rejected"
            );
            return;
        }

        if record.owner != sender {
            tracing::debug!(network_id = %record.network_id, from = %record.owner, to = %sender, "ownership transferred");
        }
        record.owner = sender;
        record.last_owned = last_owned;

        let ctx = TemplateContext {
            entity,
            network_id: record.network_id,
            sender,
        };
        let Some(template) = self.templates.get(record.template_id.0 as usize) else {
            return;
        };
        if let Err(err) = template.on_update(world, &ctx, data) {
            tracing::warn!(network_id = %ctx.network_id, %err, "remote update rejected");
        }
    }

    // =========================================================================
    // Send
    // =========================================================================

    /// Runs a network tick if `network_tick_interval_ms` has passed since the
    /// last one. Returns `None` when it is not due yet.
    pub fn send(&mut self, world: &W, now_ms: u32) -> Option<NetworkTickStats> {
        if let Some(last) = self.last_network_tick {
            if now_ms.wrapping_sub(last) < self.network_tick_interval_ms {
                return None;
            }
        }
        self.last_network_tick = Some(now_ms);

        let mut stats = NetworkTickStats::default();

        for (entity, record) in self.entities.iter_mut() {
            if !record.owner.is_local() {
                continue;
            }
            let Some(template) = self.templates.get(record.template_id.0 as usize) else {
                continue;
            };
            let snapshot = *record;
            let ctx = TemplateContext {
                entity,
                network_id: snapshot.network_id,
                sender: ParticipantId::LOCAL,
            };

            let result = if snapshot.sent {
                template.send_update(world, &ctx).and_then(|data| {
                    let update = NetworkMessage::Update {
                        network_id: snapshot.network_id,
                        last_owned: snapshot.last_owned,
                        data: data.clone(),
                    }
                    .encode()?;
                    let create = create_message(&snapshot, data).encode()?;
                    Ok((create, update))
                })
            } else {
                template.send_create(world, &ctx).and_then(|data| {
                    let create = create_message(&snapshot, data).encode()?;
                    Ok((create.clone(), create))
                })
            };

            match result {
                Ok((create, steady)) => {
                    stats.frames += broadcast(&mut self.channels, &create, &steady);
                    if record.sent {
                        stats.updates += 1;
                    } else {
                        record.sent = true;
                        stats.creates += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(network_id = %record.network_id, %err, "entity state not serializable; skipped");
                }
            }
        }

        for network_id in self.pending_deletes.drain(..) {
            match (NetworkMessage::Delete { network_id }).encode() {
                Ok(frame) => {
                    stats.frames += broadcast(&mut self.channels, &frame, &frame);
                    stats.deletes += 1;
                }
                Err(err) => tracing::warn!(%network_id, %err, "delete not serializable"),
            }
        }

        for peer in &mut self.channels {
            peer.first_sync = false;
        }

        tracing::trace!(?stats, "network tick");
        Some(stats)
    }
}

fn create_message(record: &NetworkedEntity, data: serde_json::Value) -> NetworkMessage {
    NetworkMessage::Create {
        network_id: record.network_id,
        template_id: record.template_id,
        last_owned: record.last_owned,
        data,
    }
}

/// Sends `first_sync_frame` to peers that have not been synced yet and
/// `frame` to everyone else. Returns the number of frames accepted.
fn broadcast(channels: &mut [PeerChannel], first_sync_frame: &str, frame: &str) -> usize {
    let mut sent = 0;
    for peer in channels.iter_mut() {
        let payload = if peer.first_sync { first_sync_frame } else { frame };
        match peer.channel.send(payload) {
            Ok(()) => sent += 1,
            Err(err) => tracing::debug!(participant = %peer.participant, %err, "frame not sent"),
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use serde_json::{json, Value};

    /// World of one integer per entity.
    type Counters = HashMap<EntityId, i64>;

    struct CounterTemplate;

    impl NetworkTemplate<Counters> for CounterTemplate {
        fn on_create(&self, world: &mut Counters, ctx: &TemplateContext, data: &Value) -> Result<(), ProtocolError> {
            let value = data
                .as_i64()
                .ok_or_else(|| ProtocolError::InvalidPayload("expected integer".into()))?;
            world.insert(ctx.entity, value);
            Ok(())
        }

        fn on_update(&self, world: &mut Counters, ctx: &TemplateContext, data: &Value) -> Result<(), ProtocolError> {
            self.on_create(world, ctx, data)
        }

        fn on_delete(&self, world: &mut Counters, ctx: &TemplateContext) {
            world.remove(&ctx.entity);
        }

        fn send_create(&self, world: &Counters, ctx: &TemplateContext) -> Result<Value, ProtocolError> {
            Ok(json!(world.get(&ctx.entity).copied().unwrap_or_default()))
        }
    }

    fn replicator(user: &str) -> (Replicator<Counters>, TemplateId) {
        let mut replicator = Replicator::new(user, 50, NetworkIdAllocator::seeded(1));
        let template = replicator.register_template(CounterTemplate);
        (replicator, template)
    }

    fn decode_all(rx: &Receiver<String>) -> Vec<NetworkMessage> {
        rx.try_iter().map(|frame| NetworkMessage::decode(&frame).unwrap()).collect()
    }

    #[test]
    fn test_templates_are_sequential() {
        let mut replicator: Replicator<Counters> = Replicator::new("@me", 50, NetworkIdAllocator::seeded(1));
        assert_eq!(replicator.register_template(CounterTemplate), TemplateId(0));
        assert_eq!(replicator.register_template(CounterTemplate), TemplateId(1));
    }

    #[test]
    fn test_spawn_rules() {
        let (mut r, template) = replicator("@me");
        let a = r.spawn(template, 0).unwrap();
        assert!(r.is_mine(a));
        assert!(!r.entity(a).unwrap().network_id.is_null());

        assert!(r.spawn_with_id(NetworkId(42), template, 0).is_ok());
        assert_eq!(
            r.spawn_with_id(NetworkId(42), template, 0),
            Err(ReplicationError::DuplicateNetworkId(NetworkId(42)))
        );
        assert_eq!(
            r.spawn(TemplateId(9), 0),
            Err(ReplicationError::UnknownTemplate(TemplateId(9)))
        );
    }

    #[test]
    fn test_send_is_gated_by_interval() {
        let (mut r, _) = replicator("@me");
        let world = Counters::new();
        assert!(r.send(&world, 1000).is_some());
        assert!(r.send(&world, 1049).is_none());
        assert!(r.send(&world, 1050).is_some());
    }

    #[test]
    fn test_create_then_update_then_delete() {
        let (mut r, template) = replicator("@me");
        let (ours, theirs) = MemoryChannel::pair();
        let peer_rx = theirs.incoming();
        let _inbound = r.open_channel("@peer", Box::new(ours));

        let mut world = Counters::new();
        let entity = r.spawn_with_id(NetworkId(7), template, 10).unwrap();
        world.insert(entity, 5);

        let stats = r.send(&world, 100).unwrap();
        assert_eq!((stats.creates, stats.updates), (1, 0));

        world.insert(entity, 6);
        let stats = r.send(&world, 150).unwrap();
        assert_eq!((stats.creates, stats.updates), (0, 1));

        r.despawn(entity).unwrap();
        let stats = r.send(&world, 200).unwrap();
        assert_eq!(stats.deletes, 1);

        assert_eq!(
            decode_all(&peer_rx),
            vec![
                NetworkMessage::Create {
                    network_id: NetworkId(7),
                    template_id: template,
                    last_owned: 10,
                    data: json!(5),
                },
                NetworkMessage::Update {
                    network_id: NetworkId(7),
                    last_owned: 10,
                    data: json!(6),
                },
                NetworkMessage::Delete {
                    network_id: NetworkId(7)
                },
            ]
        );
    }

    #[test]
    fn test_first_sync_peer_gets_create_for_known_entity() {
        let (mut r, template) = replicator("@me");
        let mut world = Counters::new();
        let entity = r.spawn_with_id(NetworkId(3), template, 0).unwrap();
        world.insert(entity, 1);
        r.send(&world, 0).unwrap();

        let (ours, theirs) = MemoryChannel::pair();
        let peer_rx = theirs.incoming();
        r.open_channel("@late", Box::new(ours));

        r.send(&world, 50).unwrap();
        r.send(&world, 100).unwrap();
        let kinds: Vec<_> = decode_all(&peer_rx)
            .iter()
            .map(NetworkMessage::message_type)
            .collect();
        assert_eq!(
            kinds,
            vec![crate::protocol::MessageType::Create, crate::protocol::MessageType::Update]
        );
    }

    #[test]
    fn test_receive_applies_in_arrival_order() {
        let (mut r, template) = replicator("@me");
        let (ours, _theirs) = MemoryChannel::pair();
        let inbound = r.open_channel("@peer", Box::new(ours));
        let mut world = Counters::new();

        inbound
            .push_message(NetworkMessage::Create {
                network_id: NetworkId(9),
                template_id: template,
                last_owned: 1,
                data: json!(1),
            });
        inbound.push(r#"{"t":1,"n":9,"o":1,"d":2}"#).unwrap();
        inbound.push(r#"{"t":1,"n":9,"o":1,"d":3}"#).unwrap();
        assert!(inbound.push("garbage").is_err());

        assert_eq!(r.receive(&mut world), 3);
        let entity = r.lookup(NetworkId(9)).unwrap();
        assert_eq!(world[&entity], 3);
        assert_eq!(r.entity(entity).unwrap().owner, inbound.participant());
        assert!(!r.is_mine(entity));
    }

    #[test]
    fn test_stale_update_rejected_and_newer_claim_transfers() {
        let (mut r, template) = replicator("@me");
        let (ours, _theirs) = MemoryChannel::pair();
        let inbound = r.open_channel("@peer", Box::new(ours));
        let mut world = Counters::new();

        let entity = r.spawn_with_id(NetworkId(5), template, 100).unwrap();
        world.insert(entity, 0);

        // Older stamp than ours: rejected, we stay owner.
        inbound.push(r#"{"t":1,"n":5,"o":99,"d":99}"#).unwrap();
        r.receive(&mut world);
        assert!(r.is_mine(entity));
        assert_eq!(world[&entity], 0);

        // Same stamp, "@peer" > "@me": claim wins.
        inbound.push(r#"{"t":1,"n":5,"o":100,"d":7}"#).unwrap();
        r.receive(&mut world);
        assert!(!r.is_mine(entity));
        assert_eq!(world[&entity], 7);

        // Taking it back beats the current stamp.
        r.take_ownership(entity, 50).unwrap();
        assert!(r.is_mine(entity));
        assert_eq!(r.entity(entity).unwrap().last_owned, 101);
    }

    #[test]
    fn test_unknown_update_and_delete_are_dropped() {
        let (mut r, _) = replicator("@me");
        let (ours, _theirs) = MemoryChannel::pair();
        let inbound = r.open_channel("@peer", Box::new(ours));
        let mut world = Counters::new();

        inbound.push(r#"{"t":1,"n":77,"o":1,"d":1}"#).unwrap();
        inbound.push(r#"{"t":2,"n":77}"#).unwrap();
        assert_eq!(r.receive(&mut world), 2);
        assert!(r.is_empty());
    }

    #[test]
    fn test_rejected_create_leaves_no_entity() {
        let (mut r, template) = replicator("@me");
        let (ours, _theirs) = MemoryChannel::pair();
        let inbound = r.open_channel("@peer", Box::new(ours));
        let mut world = Counters::new();

        inbound.push_message(NetworkMessage::Create {
            network_id: NetworkId(4),
            template_id: template,
            last_owned: 1,
            data: json!("not a number"),
        });
        r.receive(&mut world);
        assert!(r.lookup(NetworkId(4)).is_none());
        assert!(world.is_empty());
    }

    #[test]
    fn test_close_channel_keeps_queued_messages() {
        let (mut r, template) = replicator("@me");
        let (ours, theirs) = MemoryChannel::pair();
        let inbound = r.open_channel("@peer", Box::new(ours));
        let mut world = Counters::new();

        inbound.push_message(NetworkMessage::Create {
            network_id: NetworkId(8),
            template_id: template,
            last_owned: 1,
            data: json!(4),
        });
        assert!(r.close_channel("@peer"));
        assert!(!theirs.is_open());
        assert!(!r.close_channel("@peer"));
        assert_eq!(r.channel_count(), 0);

        r.receive(&mut world);
        assert!(r.lookup(NetworkId(8)).is_some());
    }

    #[test]
    fn test_dispose_closes_everything() {
        let (mut r, _) = replicator("@me");
        let (a, a_peer) = MemoryChannel::pair();
        let (b, b_peer) = MemoryChannel::pair();
        r.open_channel("@a", Box::new(a));
        r.open_channel("@b", Box::new(b));

        r.dispose();
        assert!(!a_peer.is_open());
        assert!(!b_peer.is_open());
        assert_eq!(r.participants().len(), 1);
    }
}
