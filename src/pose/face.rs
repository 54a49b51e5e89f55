//! Facial expressions. Each fires its action once when the expression
//! appears and re-arms when it goes away or the face is lost.

use anyhow::Result;
use serde::Deserialize;
use std::marker::PhantomData;

use super::{Pose, PoseKind};
use crate::action::{ActionDescriptor, Dispatcher};
use crate::debounce::EdgeLatch;
use crate::frame::{HeadGesture, Person};
use crate::runtime::Runtime;
use crate::view::View;

/// Ties a pose kind to the head property it watches.
pub trait ExpressionKind: Send + 'static {
    const KIND: &'static str;
    const GESTURE: HeadGesture;
}

macro_rules! expression {
    ($name:ident, $kind:literal, $gesture:ident) => {
        pub struct $name;

        impl ExpressionKind for $name {
            const KIND: &'static str = $kind;
            const GESTURE: HeadGesture = HeadGesture::$gesture;
        }
    };
}

expression!(Smile, "smile", Smiling);
expression!(OpenMouth, "open_mouth", OpenMouth);
expression!(RaiseEyebrows, "raise_eyebrows", RaiseEyebrows);
expression!(FishFace, "fish_face", FishFace);

#[derive(Debug, Deserialize)]
pub struct ExpressionOptions {
    #[serde(default)]
    pub action: Option<ActionDescriptor>,
}

pub struct Expression<M: ExpressionKind> {
    latch: EdgeLatch,
    dispatcher: Dispatcher,
    runtime: Runtime,
    _kind: PhantomData<M>,
}

impl<M: ExpressionKind> PoseKind for Expression<M> {
    const KIND: &'static str = M::KIND;
    type Options = ExpressionOptions;

    fn make(options: ExpressionOptions, runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            latch: EdgeLatch::new(),
            dispatcher: Dispatcher::resolve(options.action.as_ref(), runtime)?,
            runtime: runtime.clone(),
            _kind: PhantomData,
        })
    }
}

impl<M: ExpressionKind> Pose for Expression<M> {
    fn check(&mut self, person: &Person) -> bool {
        let Some(head) = &person.head else {
            self.latch.reset();
            self.dispatcher.settle(&self.runtime);
            return false;
        };
        let showing = head.is(M::GESTURE);
        if !showing {
            self.dispatcher.settle(&self.runtime);
        }
        self.latch.rising(showing)
    }

    fn act(&mut self, _person: &Person, _view: &mut dyn View) {
        self.dispatcher.fire(&self.runtime);
    }

    fn release_all(&mut self) {
        self.dispatcher.settle(&self.runtime);
    }
}
