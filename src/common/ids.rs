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
use std::fmt;
use std::str::FromStr;

/// Plan node id in splitline's internal representation.
///
/// Identifies one source plan node of a task fragment; every split and every
/// "no more splits" declaration is addressed to exactly one plan node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PlanNodeId(pub i32);

impl PlanNodeId {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for PlanNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<PlanNodeId> for i32 {
    fn from(value: PlanNodeId) -> Self {
        value.0
    }
}

impl FromStr for PlanNodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = s
            .trim()
            .parse::<i32>()
            .map_err(|e| format!("invalid plan node id string '{}': {}", s, e))?;
        Ok(Self(v))
    }
}

/// Split group id (bucket id) used by grouped execution.
///
/// `SplitGroupId::UNGROUPED` is reserved for tasks that run without grouped execution.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SplitGroupId(pub i32);

impl SplitGroupId {
    pub const UNGROUPED: SplitGroupId = SplitGroupId(-1);

    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn as_i32(self) -> i32 {
        self.0
    }

    pub const fn is_ungrouped(self) -> bool {
        self.0 == Self::UNGROUPED.0
    }
}

impl fmt::Display for SplitGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ungrouped() {
            write!(f, "ungrouped")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<SplitGroupId> for i32 {
    fn from(value: SplitGroupId) -> Self {
        value.0
    }
}

impl TryFrom<u32> for SplitGroupId {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        let v = i32::try_from(value).map_err(|_| format!("invalid split group id: {}", value))?;
        Ok(Self(v))
    }
}
