// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::common::ids::SplitGroupId;

/// Connector-defined split payload.
///
/// The split path never looks inside the payload; source operators downcast it
/// through `as_any` to the connector type they were built for.
pub trait ConnectorSplit: Send + Sync + fmt::Debug {
    fn connector_id(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

/// One unit of source input assigned to a plan node.
///
/// Splits are not `Clone`: a split is owned by the producer until it is queued
/// and by exactly one driver after it is taken.
#[derive(Debug)]
pub struct Split {
    connector_split: Arc<dyn ConnectorSplit>,
    group_id: SplitGroupId,
}

impl Split {
    pub fn new(connector_split: Arc<dyn ConnectorSplit>, group_id: SplitGroupId) -> Self {
        Self {
            connector_split,
            group_id,
        }
    }

    pub fn ungrouped(connector_split: Arc<dyn ConnectorSplit>) -> Self {
        Self::new(connector_split, SplitGroupId::UNGROUPED)
    }

    pub fn group_id(&self) -> SplitGroupId {
        self.group_id
    }

    pub fn connector_split(&self) -> &Arc<dyn ConnectorSplit> {
        &self.connector_split
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.connector_split.as_any().downcast_ref::<T>()
    }

    pub(crate) fn with_group_id(mut self, group_id: SplitGroupId) -> Self {
        self.group_id = group_id;
        self
    }
}
