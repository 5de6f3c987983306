// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Mock collaborators for driving connections without a TLS stack,
//! congestion controller or application.

use crate::{
    config::Config,
    connection::{Connection, InternalConnectionIdGenerator, Parameters, Shared},
    error::Error,
    id_tables::IdTables,
    scheduler::Scheduler,
};
use quicctx_core::{
    event,
    inet::{Ipv4Addr, SocketAddr},
    random,
    stateless_reset,
    time::Timestamp,
};

pub mod congestion {
    use crate::{congestion::Algorithm, path::Recovery};
    use alloc::boxed::Box;
    use core::sync::atomic::{AtomicU32, Ordering};
    use quicctx_core::time::Timestamp;

    /// Counts how often it was set up and released on a path
    #[derive(Debug)]
    pub struct Mock {
        name: &'static str,
        inits: AtomicU32,
        deletes: AtomicU32,
    }

    impl Mock {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                inits: AtomicU32::new(0),
                deletes: AtomicU32::new(0),
            }
        }

        pub fn inits(&self) -> u32 {
            self.inits.load(Ordering::Relaxed)
        }

        pub fn deletes(&self) -> u32 {
            self.deletes.load(Ordering::Relaxed)
        }
    }

    impl Algorithm for Mock {
        fn name(&self) -> &'static str {
            self.name
        }

        fn init(&self, recovery: &mut Recovery, _option: Option<&str>, _now: Timestamp) {
            self.inits.fetch_add(1, Ordering::Relaxed);
            recovery.congestion_state = Some(Box::new(self.name));
        }

        fn delete(&self, recovery: &mut Recovery) {
            self.deletes.fetch_add(1, Ordering::Relaxed);
            recovery.congestion_state = None;
        }
    }
}

pub mod tls {
    use crate::tls::{Error, SessionInfo};
    use alloc::{boxed::Box, rc::Rc};
    use core::cell::Cell;
    use quicctx_core::connection::InitialId;

    /// Counters shared between a provider and the sessions it created
    #[derive(Debug, Default)]
    pub struct Stats {
        pub sessions: Cell<u32>,
        pub initial_keys: Cell<u32>,
        pub rotations: Cell<u32>,
    }

    #[derive(Clone, Debug)]
    pub struct Provider {
        pub has_server_credentials: bool,
        /// Fails every session creation when set
        pub fail_sessions: bool,
        pub stats: Rc<Stats>,
    }

    impl Default for Provider {
        fn default() -> Self {
            Self {
                has_server_credentials: true,
                fail_sessions: false,
                stats: Rc::default(),
            }
        }
    }

    impl crate::tls::Provider for Provider {
        fn has_server_credentials(&self) -> bool {
            self.has_server_credentials
        }

        fn new_session(
            &mut self,
            _info: &SessionInfo,
        ) -> Result<Box<dyn crate::tls::Session>, Error> {
            if self.fail_sessions {
                return Err(Error::SessionCreation);
            }
            self.stats.sessions.set(self.stats.sessions.get() + 1);
            Ok(Box::new(Session {
                stats: self.stats.clone(),
            }))
        }
    }

    #[derive(Debug)]
    pub struct Session {
        stats: Rc<Stats>,
    }

    impl crate::tls::Session for Session {
        fn setup_initial_keys(&mut self, _initial_id: &InitialId, _version: u32) -> Result<(), Error> {
            self.stats.initial_keys.set(self.stats.initial_keys.get() + 1);
            Ok(())
        }

        fn rotate_keys(&mut self) -> Result<(), Error> {
            self.stats.rotations.set(self.stats.rotations.get() + 1);
            Ok(())
        }
    }
}

pub mod callback {
    use crate::{
        callback::{Callback, Error, Event, Handle},
        connection::InternalConnectionId,
    };
    use alloc::{rc::Rc, vec::Vec};
    use core::cell::{Cell, RefCell};

    /// Records every event it receives. Clones share the same log.
    #[derive(Clone, Debug, Default)]
    pub struct Recorder {
        events: Rc<RefCell<Vec<(InternalConnectionId, Event)>>>,
        fail: Rc<Cell<bool>>,
    }

    impl Recorder {
        pub fn new() -> Self {
            Self::default()
        }

        /// A handle to attach to a connection, sharing this recorder's log
        pub fn handle(&self) -> Handle {
            Rc::new(RefCell::new(self.clone()))
        }

        /// Makes the next events fail, as an application rejecting them would
        pub fn set_fail(&self, fail: bool) {
            self.fail.set(fail);
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.borrow().iter().map(|(_, event)| *event).collect()
        }

        pub fn clear(&self) {
            self.events.borrow_mut().clear();
        }
    }

    impl Callback for Recorder {
        fn on_event(&mut self, connection: InternalConnectionId, event: Event) -> Result<(), Error> {
            self.events.borrow_mut().push((connection, event));
            if self.fail.get() {
                Err(Error)
            } else {
                Ok(())
            }
        }
    }
}

/// An IPv4 test address in the documentation range
pub fn v4(last: u8, port: u16) -> SocketAddr {
    SocketAddr::new(Ipv4Addr::new(192, 0, 2, last).into(), port)
}

/// The context-wide state [`Shared`] borrows from, owned by a test
pub struct Harness {
    pub id_tables: IdTables,
    pub scheduler: Scheduler,
    pub random: random::testing::Generator,
    pub subscriber: event::testing::Subscriber,
    pub tls: tls::Provider,
    pub reset_seed: [u8; stateless_reset::LEN],
    pub now: Timestamp,
    ids: InternalConnectionIdGenerator,
    callback: callback::Recorder,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            id_tables: IdTables::new([1; 16], 16),
            scheduler: Scheduler::new(),
            random: random::testing::Generator(0x30),
            subscriber: event::testing::Subscriber::new(),
            tls: tls::Provider::default(),
            reset_seed: [2; stateless_reset::LEN],
            now: Timestamp::from_micros(1_000_000),
            ids: InternalConnectionIdGenerator::new(),
            callback: callback::Recorder::new(),
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&mut self) -> Shared<'_> {
        Shared {
            id_tables: &mut self.id_tables,
            scheduler: &mut self.scheduler,
            random: &mut self.random,
            subscriber: &mut self.subscriber,
            tls: &mut self.tls,
            reset_seed: &self.reset_seed,
            now: self.now,
        }
    }

    /// The recorder attached to connections made with [`Self::client`]
    pub fn callback(&self) -> &callback::Recorder {
        &self.callback
    }

    /// Client parameters towards a fixed server address, with the recording callback attached
    pub fn client(&self) -> Parameters {
        Parameters::client(v4(10, 4433))
            .with_local_addr(v4(1, 5000))
            .with_callback(self.callback.handle())
    }

    /// Builds a connection outside of a context
    pub fn build(&mut self, config: &Config, parameters: Parameters) -> Result<Connection, Error> {
        let id = self.ids.generate_id();
        parameters.build(id, config, &mut self.shared())
    }

    pub fn advance(&mut self, duration: core::time::Duration) {
        self.now = self.now + duration;
    }
}

