// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod api_versions;
mod handler;

// request and response
pub use api_versions::ApiVersionRange;
pub use api_versions::ApiVersionsResponse;
pub use api_versions::{
    API_VERSIONS_FLEXIBLE_FROM, API_VERSIONS_MAX_VERSION, API_VERSIONS_MIN_VERSION,
};

// api handler
pub use api_versions::ApiVersionsHandler;
pub use handler::ApiHandler;
