//! Physics body registry.
//!
//! Owns every application-level body and the mapping from Rapier collider
//! handles to them. Rapier forbids structural changes while it steps, so:
//!
//! - `add` is rejected while a step is in progress;
//! - bodies are only ever *marked* for deletion, and `process_deferred`
//!   (after the step) is the single place that destroys them;
//! - contact callbacks are dispatched from one routine that skips bodies
//!   already marked for deletion.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use rapier2d::prelude::*;

use crate::bodies::{BodyKind, BodyMeta, BodySpec};
use crate::config::WarpConfig;
use crate::error::WarpError;
use crate::physics::{ContactPhase, PhysicsWorld, RawContact};

/// Application-assigned body ID. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId(u64);

impl BodyId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Packs a kind tag and body id into rapier `user_data`.
pub fn encode_user_data(kind: BodyKind, id: BodyId) -> u128 {
    (u128::from(kind.tag()) << 64) | u128::from(id.0)
}

/// Inverse of [`encode_user_data`]. `None` for untagged colliders.
pub fn decode_user_data(user_data: u128) -> Option<(BodyKind, BodyId)> {
    #[allow(clippy::cast_possible_truncation)]
    let (tag, id) = ((user_data >> 64) as u64, user_data as u64);
    BodyKind::from_tag(tag).map(|kind| (kind, BodyId(id)))
}

/// Cheap reference to a registered body.
///
/// Rapier may recycle handle slots, so identity is the `BodyId`, never the
/// native handles.
#[derive(Debug, Clone, Copy)]
pub struct BodyRef {
    id: BodyId,
    body: RigidBodyHandle,
    collider: ColliderHandle,
}

impl BodyRef {
    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn body_handle(&self) -> RigidBodyHandle {
        self.body
    }

    pub fn collider_handle(&self) -> ColliderHandle {
        self.collider
    }

    /// True only when both refer to the same registered body.
    pub fn is(&self, other: &BodyRef) -> bool {
        self.id == other.id
    }
}

/// A contact as seen from one participating body.
#[derive(Debug, Clone, Copy)]
pub struct ContactEvent {
    pub phase: ContactPhase,
    pub this: BodyRef,
    pub other: BodyRef,
}

/// Final state of a body handed to its deletion listener.
#[derive(Debug, Clone)]
pub struct DeletedBody {
    pub body: BodyRef,
    pub kind: BodyKind,
    pub meta: BodyMeta,
    pub position: [f32; 2],
}

pub type ContactCallback<E> =
    Box<dyn FnMut(&mut PhysicsRegistry<E>, ContactEvent) -> Result<(), WarpError> + Send + Sync>;

pub type DeletionListener = Box<dyn FnOnce(&DeletedBody) + Send + Sync>;

/// A registered body with its callbacks and deletion flag.
pub struct WrappedBody<E> {
    handle: BodyRef,
    kind: BodyKind,
    meta: BodyMeta,
    marked_for_deletion: bool,
    on_contact: Option<ContactCallback<E>>,
    on_delete: Option<DeletionListener>,
}

impl<E> WrappedBody<E> {
    pub fn id(&self) -> BodyId {
        self.handle.id
    }

    pub fn body_ref(&self) -> BodyRef {
        self.handle
    }

    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    pub fn meta(&self) -> &BodyMeta {
        &self.meta
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.marked_for_deletion
    }
}

impl<E> fmt::Debug for WrappedBody<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedBody")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("meta", &self.meta)
            .field("marked_for_deletion", &self.marked_for_deletion)
            .field("has_contact_callback", &self.on_contact.is_some())
            .field("has_deletion_listener", &self.on_delete.is_some())
            .finish()
    }
}

/// Registry of wrapped bodies over a `PhysicsWorld`.
///
/// `E` is the event type contact callbacks may emit through [`Self::emit`].
pub struct PhysicsRegistry<E> {
    world: PhysicsWorld,
    bodies: BTreeMap<BodyId, WrappedBody<E>>,
    handles: HashMap<ColliderHandle, BodyId>,
    touching: BTreeMap<BodyId, BTreeSet<BodyId>>,
    next_id: u64,
    stepping: bool,
    outbox: Vec<E>,
}

impl<E> Default for PhysicsRegistry<E> {
    fn default() -> Self {
        Self::new(PhysicsWorld::new())
    }
}

impl<E> fmt::Debug for PhysicsRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicsRegistry")
            .field("world", &self.world)
            .field("body_count", &self.bodies.len())
            .field("stepping", &self.stepping)
            .field("pending_events", &self.outbox.len())
            .finish_non_exhaustive()
    }
}

impl<E> PhysicsRegistry<E> {
    pub fn new(world: PhysicsWorld) -> Self {
        Self {
            world,
            bodies: BTreeMap::new(),
            handles: HashMap::new(),
            touching: BTreeMap::new(),
            next_id: 0,
            stepping: false,
            outbox: Vec::new(),
        }
    }

    pub fn from_config(config: &WarpConfig) -> Self {
        let [gx, gy] = config.gravity;
        let mut world = PhysicsWorld::with_gravity(Vector::new(gx, gy));
        world.integration_parameters.dt = config.dt;
        Self::new(world)
    }

    /// Builds a body from `producer(params)`, registers it and returns a ref.
    ///
    /// Fails with [`WarpError::StepInProgress`] before the producer runs if
    /// called from inside a step.
    pub fn add<P: ?Sized>(
        &mut self,
        producer: impl FnOnce(&P) -> BodySpec,
        params: &P,
    ) -> Result<BodyRef, WarpError> {
        if self.stepping {
            return Err(WarpError::StepInProgress);
        }

        let BodySpec {
            kind,
            mut body,
            mut collider,
            meta,
        } = producer(params);

        let id = BodyId(self.next_id);
        self.next_id += 1;
        body.user_data = encode_user_data(kind, id);
        collider.user_data = encode_user_data(kind, id);

        let body = self.world.add_rigid_body(body);
        let collider = self.world.add_collider(collider, body);
        self.handles.insert(collider, id);

        let handle = BodyRef { id, body, collider };
        self.bodies.insert(
            id,
            WrappedBody {
                handle,
                kind,
                meta,
                marked_for_deletion: false,
                on_contact: None,
                on_delete: None,
            },
        );

        tracing::debug!("[registry] added {:?} {}", kind, id);
        Ok(handle)
    }

    /// Inserts an unregistered static collider (boundaries, housekeeping).
    pub fn add_static_collider(&mut self, collider: Collider) -> Result<ColliderHandle, WarpError> {
        if self.stepping {
            return Err(WarpError::StepInProgress);
        }
        Ok(self.world.add_static_collider(collider))
    }

    pub fn set_contact_callback(
        &mut self,
        id: BodyId,
        callback: ContactCallback<E>,
    ) -> Result<(), WarpError> {
        let body = self.bodies.get_mut(&id).ok_or(WarpError::UnknownBody(id))?;
        body.on_contact = Some(callback);
        Ok(())
    }

    pub fn set_deletion_listener(
        &mut self,
        id: BodyId,
        listener: DeletionListener,
    ) -> Result<(), WarpError> {
        let body = self.bodies.get_mut(&id).ok_or(WarpError::UnknownBody(id))?;
        body.on_delete = Some(listener);
        Ok(())
    }

    /// Schedules a body for removal in the next `process_deferred`.
    ///
    /// Marking twice is a [`WarpError::DoubleDeletion`].
    pub fn mark_for_deletion(&mut self, id: BodyId) -> Result<(), WarpError> {
        let body = self.bodies.get_mut(&id).ok_or(WarpError::UnknownBody(id))?;
        if body.marked_for_deletion {
            return Err(WarpError::DoubleDeletion(id));
        }
        body.marked_for_deletion = true;
        tracing::debug!("[registry] marked {} for deletion", id);
        Ok(())
    }

    pub fn is_marked(&self, id: BodyId) -> bool {
        self.bodies.get(&id).is_some_and(|b| b.marked_for_deletion)
    }

    /// Advances the simulation by `dt` and dispatches contact callbacks.
    ///
    /// Contacts with an unregistered collider are dropped. The first callback
    /// error aborts dispatch and is returned.
    pub fn step(&mut self, dt: f32) -> Result<(), WarpError> {
        if self.stepping {
            return Err(WarpError::StepInProgress);
        }

        self.stepping = true;
        let contacts = self.world.step_with_events(dt);
        let result = self.dispatch(contacts);
        self.stepping = false;
        result
    }

    pub fn is_stepping(&self) -> bool {
        self.stepping
    }

    fn dispatch(&mut self, contacts: Vec<RawContact>) -> Result<(), WarpError> {
        for contact in contacts {
            let (Some(a), Some(b)) = (self.resolve(contact.a), self.resolve(contact.b)) else {
                continue;
            };

            self.record_touch(contact.phase, a.id, b.id);
            self.invoke(contact.phase, a, b)?;
            self.invoke(contact.phase, b, a)?;
        }
        Ok(())
    }

    fn record_touch(&mut self, phase: ContactPhase, a: BodyId, b: BodyId) {
        match phase {
            ContactPhase::Began => {
                self.touching.entry(a).or_default().insert(b);
                self.touching.entry(b).or_default().insert(a);
            }
            ContactPhase::Ended => {
                for (x, y) in [(a, b), (b, a)] {
                    if let Some(set) = self.touching.get_mut(&x) {
                        set.remove(&y);
                        if set.is_empty() {
                            self.touching.remove(&x);
                        }
                    }
                }
            }
        }
    }

    fn invoke(&mut self, phase: ContactPhase, this: BodyRef, other: BodyRef) -> Result<(), WarpError> {
        let Some(body) = self.bodies.get_mut(&this.id) else {
            return Ok(());
        };
        if body.marked_for_deletion {
            return Ok(());
        }
        let Some(mut callback) = body.on_contact.take() else {
            return Ok(());
        };

        tracing::debug!("[registry] contact {:?} {} -> {}", phase, this.id, other.id);
        let result = callback(self, ContactEvent { phase, this, other });

        if let Some(body) = self.bodies.get_mut(&this.id) {
            if body.on_contact.is_none() {
                body.on_contact = Some(callback);
            }
        }
        result
    }

    /// Destroys every body marked for deletion and returns their IDs.
    ///
    /// Each body's deletion listener runs before the engine body is removed.
    pub fn process_deferred(&mut self) -> Result<Vec<BodyId>, WarpError> {
        if self.stepping {
            return Err(WarpError::StepInProgress);
        }

        let marked: Vec<BodyId> = self
            .bodies
            .values()
            .filter(|b| b.marked_for_deletion)
            .map(WrappedBody::id)
            .collect();

        for &id in &marked {
            let Some(mut body) = self.bodies.remove(&id) else {
                continue;
            };
            self.handles.remove(&body.handle.collider);
            if let Some(peers) = self.touching.remove(&id) {
                for peer in peers {
                    if let Some(set) = self.touching.get_mut(&peer) {
                        set.remove(&id);
                        if set.is_empty() {
                            self.touching.remove(&peer);
                        }
                    }
                }
            }

            if let Some(listener) = body.on_delete.take() {
                let position = self.position(body.handle).unwrap_or_default();
                listener(&DeletedBody {
                    body: body.handle,
                    kind: body.kind,
                    meta: body.meta.clone(),
                    position,
                });
            }

            self.world.remove_rigid_body(body.handle.body);
            tracing::debug!("[registry] removed {:?} {}", body.kind, id);
        }

        Ok(marked)
    }

    /// Resolves a native collider handle to its registered body.
    pub fn resolve(&self, handle: ColliderHandle) -> Option<BodyRef> {
        let id = self.handles.get(&handle)?;
        self.bodies.get(id).map(WrappedBody::body_ref)
    }

    pub fn get(&self, id: BodyId) -> Option<&WrappedBody<E>> {
        self.bodies.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WrappedBody<E>> {
        self.bodies.values()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Registered bodies currently in contact with `id`.
    pub fn touching(&self, id: BodyId) -> impl Iterator<Item = BodyId> + '_ {
        self.touching.get(&id).into_iter().flatten().copied()
    }

    /// Current translation of the body's rigid body.
    pub fn position(&self, body: BodyRef) -> Option<[f32; 2]> {
        self.world.get_rigid_body(body.body).map(|b| {
            let pos = b.translation();
            [pos.x, pos.y]
        })
    }

    /// Teleports a body. Not structural, so allowed at any time.
    pub fn set_position(&mut self, body: BodyRef, position: [f32; 2]) -> Result<(), WarpError> {
        let rb = self
            .world
            .get_rigid_body_mut(body.body)
            .ok_or(WarpError::UnknownBody(body.id))?;
        rb.set_translation(Vector::new(position[0], position[1]), true);
        Ok(())
    }

    pub fn linvel(&self, body: BodyRef) -> Option<[f32; 2]> {
        self.world.get_rigid_body(body.body).map(|b| {
            let vel = b.linvel();
            [vel.x, vel.y]
        })
    }

    pub fn set_linvel(&mut self, body: BodyRef, velocity: [f32; 2]) -> Result<(), WarpError> {
        let rb = self
            .world
            .get_rigid_body_mut(body.body)
            .ok_or(WarpError::UnknownBody(body.id))?;
        rb.set_linvel(Vector::new(velocity[0], velocity[1]), true);
        Ok(())
    }

    /// Queues an event for the embedder; drained after the step.
    pub fn emit(&mut self, event: E) {
        self.outbox.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<E> {
        std::mem::take(&mut self.outbox)
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }
}
