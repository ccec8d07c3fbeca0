/*
Copyright (c) 2021 VMware, Inc.
SPDX-License-Identifier: MIT
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

extern crate protoc_grpcio;

// Include roots, each with the protos compiled from it.
const PROTOS: &[(&str, &[&str])] = &[
    (
        "p4runtime/proto",
        &[
            "p4/v1/p4runtime.proto",
            "p4/v1/p4data.proto",
            "p4/config/v1/p4info.proto",
            "p4/config/v1/p4types.proto",
        ],
    ),
    ("googleapis", &["google/rpc/status.proto", "google/rpc/code.proto"]),
];

fn main() {
    let includes: Vec<&str> = PROTOS.iter().map(|(root, _)| *root).collect();
    let mut inputs = Vec::new();
    for (root, files) in PROTOS {
        for file in *files {
            println!("cargo:rerun-if-changed={}/{}", root, file);
            inputs.push(*file);
        }
    }

    protoc_grpcio::compile_grpc_protos(&inputs, &includes, "src/", None)
        .expect("failed to generate P4Runtime bindings");
}
